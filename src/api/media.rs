use axum::{
    extract::State,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::db::{MediaType, User};
use crate::media::MediaSearchResult;
use crate::AppState;

use super::error::ApiError;
use super::extract::ApiQuery;

#[derive(Debug, Deserialize)]
pub struct MediaSearchQuery {
    pub query: String,
    #[serde(rename = "type")]
    pub media_type: Option<MediaType>,
}

/// GET /api/media/search?query=..&type=movie|tv
pub async fn search(
    State(state): State<Arc<AppState>>,
    _user: User,
    ApiQuery(params): ApiQuery<MediaSearchQuery>,
) -> Result<Json<Vec<MediaSearchResult>>, ApiError> {
    let query = params.query.trim();
    if query.is_empty() {
        return Err(ApiError::validation_field("query", "Search query is required"));
    }
    if query.chars().count() > 200 {
        return Err(ApiError::validation_field("query", "Search query is too long"));
    }

    let results = state.media.search(query, params.media_type).await?;
    Ok(Json(results))
}
