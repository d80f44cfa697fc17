//! Request endpoints for regular users.
//!
//! Every lookup goes through `policy::authorize`, so a missing id answers 404
//! and someone else's request answers 403.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use std::sync::Arc;

use crate::db::{CreateRequestBody, MediaRequest, RequestStatus, UpdateRequestBody, User};
use crate::policy::{self, RequestAction};
use crate::quota;
use crate::AppState;

use super::error::ApiError;
use super::extract::ApiJson;
use super::metrics::REQUESTS_SUBMITTED_TOTAL;
use super::validation::{check_create_request, check_update_request};

/// GET /api/requests - the caller's requests, newest first
pub async fn list_requests(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<Vec<MediaRequest>>, ApiError> {
    let requests = MediaRequest::list_for_user(&state.db, &user.id).await?;
    Ok(Json(requests))
}

/// POST /api/requests
///
/// The quota check and the insert run under the caller's submission lock, so
/// parallel submissions cannot both slip under the limit.
pub async fn create_request(
    State(state): State<Arc<AppState>>,
    user: User,
    ApiJson(body): ApiJson<CreateRequestBody>,
) -> Result<(StatusCode, Json<MediaRequest>), ApiError> {
    check_create_request(&body).finish()?;

    let _guard = state.submissions.acquire(&user.id).await;

    let settings = state.settings.find().await?;
    quota::check_submission_allowed(
        &state.db,
        settings.as_ref(),
        &user.id,
        Utc::now(),
        state.config.quota.week_starts_on,
    )
    .await??;

    let request = MediaRequest::create(&state.db, &user.id, &body).await?;

    metrics::counter!(REQUESTS_SUBMITTED_TOTAL, "type" => request.kind.as_str()).increment(1);
    tracing::info!(
        request_id = %request.id,
        user_id = %user.id,
        kind = request.kind.as_str(),
        media_title = %request.media_title,
        "Request submitted"
    );

    Ok((StatusCode::CREATED, Json(request)))
}

/// GET /api/requests/:id
pub async fn get_request(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<Json<MediaRequest>, ApiError> {
    let found = MediaRequest::find_by_id(&state.db, &id).await?;
    let request = policy::authorize(found, &user, RequestAction::View)?;
    Ok(Json(request))
}

/// PUT /api/requests/:id - owner edit, allowed while the request is pending
pub async fn update_request(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<UpdateRequestBody>,
) -> Result<Json<MediaRequest>, ApiError> {
    let found = MediaRequest::find_by_id(&state.db, &id).await?;
    let mut request = policy::authorize(found, &user, RequestAction::Edit)?;

    if request.status != RequestStatus::Pending {
        return Err(ApiError::conflict("Only pending requests can be edited"));
    }

    check_update_request(&body).finish()?;

    request.apply_edit(&body);
    if !request.save_edit(&state.db).await? {
        return Err(ApiError::conflict("Only pending requests can be edited"));
    }

    tracing::info!(request_id = %request.id, user_id = %user.id, "Request edited");
    Ok(Json(request))
}

/// DELETE /api/requests/:id - owners may withdraw their own requests
pub async fn delete_request(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let found = MediaRequest::find_by_id(&state.db, &id).await?;
    let request = policy::authorize(found, &user, RequestAction::Delete)?;

    if !MediaRequest::delete(&state.db, &request.id).await? {
        return Err(ApiError::not_found("Request not found"));
    }

    tracing::info!(request_id = %request.id, user_id = %user.id, "Request deleted");
    Ok(StatusCode::NO_CONTENT)
}
