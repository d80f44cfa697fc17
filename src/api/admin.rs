//! Admin triage endpoints: listing, status changes, bulk delete and the
//! dashboard views (status summary, online users, access trail).

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::{
    AccessLog, AccessLogListResponse, AccessLogQuery, MediaRequest, OnlineUser, RequestListQuery,
    RequestListResponse, Session, StatusChangeBody, StatusSummary,
};
use crate::AppState;

use super::auth::AdminUser;
use super::error::ApiError;
use super::extract::{ApiJson, ApiQuery};

/// Phrase the bulk delete must be confirmed with
pub const DELETE_ALL_CONFIRMATION: &str = "delete-all-requests";

/// GET /api/admin/requests?page&limit&status&type
pub async fn list_requests(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiQuery(query): ApiQuery<RequestListQuery>,
) -> Result<Json<RequestListResponse>, ApiError> {
    let page = MediaRequest::list_page(&state.db, &query).await?;
    Ok(Json(page))
}

/// PUT /api/admin/requests/:id
pub async fn update_request_status(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<StatusChangeBody>,
) -> Result<Json<MediaRequest>, ApiError> {
    let change = state
        .lifecycle
        .change_status(&admin, &id, body.status)
        .await?;
    Ok(Json(change.request))
}

#[derive(Debug, Deserialize)]
pub struct DeleteAllQuery {
    pub confirm: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteAllResponse {
    pub deleted: u64,
}

/// DELETE /api/admin/requests?confirm=delete-all-requests
pub async fn delete_all_requests(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    ApiQuery(query): ApiQuery<DeleteAllQuery>,
) -> Result<Json<DeleteAllResponse>, ApiError> {
    if query.confirm.as_deref() != Some(DELETE_ALL_CONFIRMATION) {
        return Err(ApiError::bad_request(format!(
            "Bulk delete must be confirmed with confirm={}",
            DELETE_ALL_CONFIRMATION
        )));
    }

    let deleted = MediaRequest::delete_all(&state.db).await?;
    tracing::warn!(admin_id = %admin.id, deleted = deleted, "All requests deleted");

    Ok(Json(DeleteAllResponse { deleted }))
}

/// GET /api/admin/metrics
pub async fn request_summary(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
) -> Result<Json<StatusSummary>, ApiError> {
    let summary = MediaRequest::status_summary(&state.db).await?;
    Ok(Json(summary))
}

/// GET /api/admin/online-users
pub async fn online_users(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
) -> Result<Json<Vec<OnlineUser>>, ApiError> {
    let window = Duration::minutes(state.config.auth.online_window_minutes);
    let since = crate::db::timestamp(Utc::now() - window);
    let users = Session::online_users(&state.db, &since).await?;
    Ok(Json(users))
}

/// GET /api/admin/access-logs?page&limit&user_id&action
pub async fn access_logs(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiQuery(query): ApiQuery<AccessLogQuery>,
) -> Result<Json<AccessLogListResponse>, ApiError> {
    let logs = AccessLog::list(&state.db, &query).await?;
    Ok(Json(logs))
}
