//! Database models split into domain-specific modules.

pub mod access_log;
pub mod request;
pub mod session;
pub mod settings;
pub mod user;

pub use access_log::*;
pub use request::*;
pub use session::*;
pub use settings::*;
pub use user::*;
