//! Account management for admins.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::db::{CreateUserRequest, NewUser, UpdateUserRequest, User, UserResponse, UserRole};
use crate::AppState;

use super::auth::{hash_password_or_500, AdminUser};
use super::error::{ApiError, ValidationErrorBuilder};
use super::extract::ApiJson;
use super::validation::{validate_email, validate_name, validate_password, validate_phone};

/// GET /api/admin/users
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    let users = User::list(&state.db).await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

/// POST /api/admin/users
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    ApiJson(req): ApiJson<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Err(e) = validate_name(&req.name) {
        errors.add("name", e);
    }
    if let Err(e) = validate_email(&req.email) {
        errors.add("email", e);
    }
    if let Err(e) = validate_password(&req.password) {
        errors.add("password", e);
    }
    if let Err(e) = validate_phone(&req.whatsapp) {
        errors.add("whatsapp", e);
    }
    errors.finish()?;

    let email = req.email.trim().to_lowercase();
    if User::find_by_email(&state.db, &email).await?.is_some() {
        return Err(ApiError::conflict("Email already registered"));
    }

    let password_hash = hash_password_or_500(&req.password)?;
    let user = User::create(
        &state.db,
        NewUser {
            email: &email,
            password_hash: &password_hash,
            name: req.name.trim(),
            role: req.role,
            whatsapp: req.whatsapp.as_deref().map(str::trim).filter(|w| !w.is_empty()),
        },
    )
    .await?;

    tracing::info!(admin_id = %admin.id, user_id = %user.id, role = %user.role, "User created");
    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// PUT /api/admin/users/:id
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateUserRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let mut user = User::find_by_id(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let mut errors = ValidationErrorBuilder::new();
    if let Some(ref name) = req.name {
        if let Err(e) = validate_name(name) {
            errors.add("name", e);
        }
    }
    if let Some(ref email) = req.email {
        if let Err(e) = validate_email(email) {
            errors.add("email", e);
        }
    }
    if let Some(ref password) = req.password {
        if let Err(e) = validate_password(password) {
            errors.add("password", e);
        }
    }
    if let Err(e) = validate_phone(&req.whatsapp) {
        errors.add("whatsapp", e);
    }
    errors.finish()?;

    if let Some(email) = req.email {
        let email = email.trim().to_lowercase();
        if email != user.email {
            if User::find_by_email(&state.db, &email).await?.is_some() {
                return Err(ApiError::conflict("Email already registered"));
            }
            user.email = email;
        }
    }
    if let Some(name) = req.name {
        user.name = name.trim().to_string();
    }
    if let Some(role) = req.role {
        if user.id == admin.id && role != UserRole::Admin {
            return Err(ApiError::bad_request("You cannot remove your own admin role"));
        }
        user.role = role;
    }
    if let Some(whatsapp) = req.whatsapp {
        let whatsapp = whatsapp.trim();
        user.whatsapp = (!whatsapp.is_empty()).then(|| whatsapp.to_string());
    }
    if let Some(ref password) = req.password {
        user.password_hash = hash_password_or_500(password)?;
    }

    let saved = user.save(&state.db).await?;
    tracing::info!(admin_id = %admin.id, user_id = %saved.id, "User updated");
    Ok(Json(UserResponse::from(saved)))
}

/// DELETE /api/admin/users/:id
///
/// The account's requests and sessions go with it; its access log entries
/// are kept.
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if id == admin.id {
        return Err(ApiError::bad_request("You cannot delete your own account"));
    }

    if !User::delete(&state.db, &id).await? {
        return Err(ApiError::not_found("User not found"));
    }

    tracing::info!(admin_id = %admin.id, user_id = %id, "User deleted");
    Ok(StatusCode::NO_CONTENT)
}
