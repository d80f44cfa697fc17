//! Body and query extractors that reject with [`ApiError`] instead of
//! axum's plain-text rejections.

use axum::extract::{FromRequest, FromRequestParts};

use super::error::ApiError;

/// JSON body; a malformed body or missing field answers `validation_error`
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Query string; unparsable parameters answer `validation_error`
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);
