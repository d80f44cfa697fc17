use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3001
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Email of the bootstrap admin, created when no admin account exists
    #[serde(default = "default_admin_email")]
    pub admin_email: String,
    /// Password of the bootstrap admin (a random one is generated when unset)
    #[serde(default)]
    pub admin_password: Option<String>,
    #[serde(default = "default_admin_name")]
    pub admin_name: String,
    /// Lifetime of a login session in hours
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: i64,
    /// A user counts as online when their session was used within this window
    #[serde(default = "default_online_window_minutes")]
    pub online_window_minutes: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            admin_email: default_admin_email(),
            admin_password: None,
            admin_name: default_admin_name(),
            session_ttl_hours: default_session_ttl_hours(),
            online_window_minutes: default_online_window_minutes(),
        }
    }
}

fn default_admin_email() -> String {
    "admin@admin.com".to_string()
}

fn default_admin_name() -> String {
    "Administrator".to_string()
}

fn default_session_ttl_hours() -> i64 {
    24
}

fn default_online_window_minutes() -> i64 {
    5
}

/// First day of the weekly submission window
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum WeekStart {
    #[default]
    Sunday,
    Monday,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct QuotaConfig {
    #[serde(default)]
    pub week_starts_on: WeekStart,
}

/// Language used for status-change messages
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
pub enum MessageLocale {
    #[default]
    #[serde(rename = "pt-BR")]
    PtBr,
    #[serde(rename = "en")]
    En,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    /// Country calling code prepended to numbers stored without one
    #[serde(default = "default_country_code")]
    pub default_country_code: String,
    #[serde(default)]
    pub locale: MessageLocale,
    /// Upper bound for a single gateway call in seconds
    #[serde(default = "default_gateway_timeout_secs")]
    pub gateway_timeout_secs: u64,
    /// Minimum interval between re-validations of the cached gateway client
    #[serde(default = "default_client_refresh_secs")]
    pub client_refresh_secs: u64,
    #[serde(default = "default_twilio_api_base")]
    pub twilio_api_base: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            default_country_code: default_country_code(),
            locale: MessageLocale::default(),
            gateway_timeout_secs: default_gateway_timeout_secs(),
            client_refresh_secs: default_client_refresh_secs(),
            twilio_api_base: default_twilio_api_base(),
        }
    }
}

fn default_country_code() -> String {
    "55".to_string()
}

fn default_gateway_timeout_secs() -> u64 {
    5
}

fn default_client_refresh_secs() -> u64 {
    60
}

fn default_twilio_api_base() -> String {
    "https://api.twilio.com/2010-04-01".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaConfig {
    /// TMDB API key; media search is unavailable without it
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_media_base_url")]
    pub base_url: String,
    #[serde(default = "default_media_language")]
    pub language: String,
    #[serde(default = "default_media_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_media_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_media_base_url(),
            language: default_media_language(),
            cache_ttl_secs: default_media_cache_ttl_secs(),
            timeout_secs: default_media_timeout_secs(),
        }
    }
}

fn default_media_base_url() -> String {
    "https://api.themoviedb.org/3".to_string()
}

fn default_media_language() -> String {
    "pt-BR".to_string()
}

fn default_media_cache_ttl_secs() -> u64 {
    300
}

fn default_media_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::parse(&content)
        } else {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).with_context(|| "Failed to parse configuration file")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.server.port, 3001);
        assert_eq!(config.auth.session_ttl_hours, 24);
        assert_eq!(config.quota.week_starts_on, WeekStart::Sunday);
        assert_eq!(config.notifications.default_country_code, "55");
        assert_eq!(config.notifications.locale, MessageLocale::PtBr);
        assert!(config.media.api_key.is_none());
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::parse(
            r#"
            [quota]
            week_starts_on = "monday"

            [notifications]
            locale = "en"
            gateway_timeout_secs = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.quota.week_starts_on, WeekStart::Monday);
        assert_eq!(config.notifications.locale, MessageLocale::En);
        assert_eq!(config.notifications.gateway_timeout_secs, 3);
        assert_eq!(config.notifications.client_refresh_secs, 60);
    }

    #[test]
    fn test_invalid_week_start_rejected() {
        assert!(Config::parse("[quota]\nweek_starts_on = \"friday\"").is_err());
    }
}
