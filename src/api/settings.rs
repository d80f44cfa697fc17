use axum::{extract::State, Json};
use std::sync::Arc;

use crate::db::{PublicSettings, SettingsResponse, UpdateSettingsRequest};
use crate::AppState;

use super::auth::AdminUser;
use super::error::ApiError;
use super::extract::ApiJson;
use super::validation::check_settings_update;

/// GET /api/admin/settings
pub async fn get_settings(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
) -> Result<Json<SettingsResponse>, ApiError> {
    let settings = state.settings.get().await?;
    Ok(Json(SettingsResponse::from(settings)))
}

/// PUT /api/admin/settings
///
/// Partial update; the row is created on first write if it is missing.
/// The daily/weekly ordering is checked again by the write itself, so a
/// concurrent edit of the other limit cannot leave them crossed.
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    ApiJson(update): ApiJson<UpdateSettingsRequest>,
) -> Result<Json<SettingsResponse>, ApiError> {
    let current = state.settings.get().await?;
    check_settings_update(
        &update,
        current.request_limit_per_day,
        current.request_limit_per_week,
    )
    .finish()?;

    let settings = state.settings.update(&update).await?;
    tracing::info!(admin_id = %admin.id, "Settings changed by admin");
    Ok(Json(SettingsResponse::from(settings)))
}

/// GET /api/platform - public, consulted by the client before login
pub async fn public_settings(
    State(state): State<Arc<AppState>>,
) -> Result<Json<PublicSettings>, ApiError> {
    Ok(Json(state.settings.public().await?))
}
