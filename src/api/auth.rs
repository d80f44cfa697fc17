use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, State},
    http::{request::Parts, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::Response,
    Json,
};
use chrono::Duration;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::db::{
    DeviceInfo, LoginRequest, LoginResponse, NewUser, RegisterRequest, Session, UpdateProfileRequest,
    User, UserResponse, UserRole,
};
use crate::AppState;

use super::error::{ApiError, ValidationErrorBuilder};
use super::extract::ApiJson;
use super::validation::{validate_email, validate_name, validate_password, validate_phone};

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

pub(crate) fn hash_password_or_500(password: &str) -> Result<String, ApiError> {
    hash_password(password).map_err(|e| {
        tracing::error!("Failed to hash password: {}", e);
        ApiError::internal("Failed to hash password")
    })
}

/// Generate a random session token
fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    hex::encode(bytes)
}

/// Hash a token for storage
fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Extract the bearer token from request headers
fn extract_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Extract the client IP address from proxy headers.
/// X-Forwarded-For wins over X-Real-IP.
pub fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|h| h.to_str().ok()) {
        if let Some(first_ip) = forwarded.split(',').next() {
            let ip = first_ip.trim();
            if !ip.is_empty() {
                return Some(ip.to_string());
            }
        }
    }

    headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
}

pub fn device_info(headers: &HeaderMap) -> DeviceInfo {
    DeviceInfo {
        user_agent: headers
            .get("user-agent")
            .and_then(|h| h.to_str().ok())
            .map(str::to_string),
        ip_address: extract_client_ip(headers),
    }
}

/// The caller's session and account
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub session: Session,
    pub user: User,
}

/// Resolve the bearer token to an active session and refresh its activity time
pub async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<AuthSession, ApiError> {
    let token = extract_token(headers).ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    let session = Session::find_active(&state.db, &hash_token(&token))
        .await?
        .ok_or_else(|| ApiError::unauthorized("Session expired or invalid"))?;

    let user = User::find_by_id(&state.db, &session.user_id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Session expired or invalid"))?;

    Session::touch(&state.db, &session.id).await?;

    Ok(AuthSession { session, user })
}

/// Authenticates protected routes and applies the platform switch.
///
/// While the platform is disabled only admins get through; everyone else
/// receives 503 with the maintenance message.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let auth = authenticate(&state, request.headers()).await?;

    if !auth.user.is_admin() {
        let settings = state.settings.get().await?;
        if !settings.platform_enabled {
            return Err(ApiError::service_unavailable(settings.disabled_message));
        }
    }

    request.extensions_mut().insert(auth);
    Ok(next.run(request).await)
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthSession {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if let Some(auth) = parts.extensions.get::<AuthSession>() {
            return Ok(auth.clone());
        }
        authenticate(state, &parts.headers).await
    }
}

/// Extractor for the current authenticated user
#[async_trait]
impl FromRequestParts<Arc<AppState>> for User {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Ok(AuthSession::from_request_parts(parts, state).await?.user)
    }
}

/// Extractor that only admits admins
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user = User::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            tracing::warn!(user_id = %user.id, path = %parts.uri.path(), "Non-admin hit admin endpoint");
            return Err(ApiError::forbidden("Not authorized"));
        }
        Ok(AdminUser(user))
    }
}

/// POST /api/auth/login
///
/// Closes any other session of the account before opening the new one.
pub async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let email = request.email.trim().to_lowercase();
    if email.is_empty() || request.password.is_empty() {
        return Err(ApiError::bad_request("Email and password are required"));
    }

    let user = User::find_by_email(&state.db, &email)
        .await?
        .filter(|user| verify_password(&request.password, &user.password_hash))
        .ok_or_else(|| {
            tracing::warn!(email = %email, "Failed login attempt");
            ApiError::unauthorized("Invalid credentials")
        })?;

    let token = generate_token();
    let device = device_info(&headers);
    let ttl = Duration::hours(state.config.auth.session_ttl_hours);
    let (session, terminated) =
        Session::start(&state.db, &user.id, &hash_token(&token), &device, ttl).await?;

    tracing::info!(
        user_id = %user.id,
        terminated_sessions = terminated,
        "User logged in"
    );

    Ok(Json(LoginResponse {
        token,
        expires_at: session.expires_at,
        user: UserResponse::from(user),
    }))
}

/// POST /api/auth/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    auth: AuthSession,
) -> Result<StatusCode, ApiError> {
    auth.session.end(&state.db, &device_info(&headers)).await?;
    tracing::info!(user_id = %auth.user.id, "User logged out");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/auth/register
///
/// Public sign-up, available while registration is enabled. New accounts are
/// always regular users.
pub async fn register(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let settings = state.settings.get().await?;
    if !settings.registration_enabled {
        return Err(ApiError::forbidden("Registration is currently disabled"));
    }

    let mut errors = ValidationErrorBuilder::new();
    if let Err(e) = validate_name(&request.name) {
        errors.add("name", e);
    }
    if let Err(e) = validate_email(&request.email) {
        errors.add("email", e);
    }
    if let Err(e) = validate_password(&request.password) {
        errors.add("password", e);
    }
    if let Err(e) = validate_phone(&request.whatsapp) {
        errors.add("whatsapp", e);
    }
    errors.finish()?;

    let email = request.email.trim().to_lowercase();
    if User::find_by_email(&state.db, &email).await?.is_some() {
        return Err(ApiError::conflict("Email already registered"));
    }

    let password_hash = hash_password_or_500(&request.password)?;
    let user = User::create(
        &state.db,
        NewUser {
            email: &email,
            password_hash: &password_hash,
            name: request.name.trim(),
            role: UserRole::User,
            whatsapp: request.whatsapp.as_deref().map(str::trim).filter(|w| !w.is_empty()),
        },
    )
    .await?;

    tracing::info!(user_id = %user.id, "User registered");
    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// GET /api/auth/me
pub async fn me(user: User) -> Json<UserResponse> {
    Json(UserResponse::from(user))
}

/// PUT /api/auth/me
///
/// Edit own name, contact number and password. Changing the password needs
/// the current one.
pub async fn update_me(
    State(state): State<Arc<AppState>>,
    mut user: User,
    ApiJson(request): ApiJson<UpdateProfileRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Some(ref name) = request.name {
        if let Err(e) = validate_name(name) {
            errors.add("name", e);
        }
    }
    if let Err(e) = validate_phone(&request.whatsapp) {
        errors.add("whatsapp", e);
    }
    if let Some(ref password) = request.password {
        if let Err(e) = validate_password(password) {
            errors.add("password", e);
        }
        let current_ok = request
            .current_password
            .as_deref()
            .is_some_and(|current| verify_password(current, &user.password_hash));
        if !current_ok {
            errors.add("current_password", "Current password is incorrect");
        }
    }
    errors.finish()?;

    if let Some(name) = request.name {
        user.name = name.trim().to_string();
    }
    if let Some(whatsapp) = request.whatsapp {
        let whatsapp = whatsapp.trim();
        user.whatsapp = (!whatsapp.is_empty()).then(|| whatsapp.to_string());
    }
    if let Some(ref password) = request.password {
        user.password_hash = hash_password_or_500(password)?;
    }

    let saved = user.save(&state.db).await?;
    Ok(Json(UserResponse::from(saved)))
}

/// Create the bootstrap admin when no admin account exists.
///
/// Without a configured password a random one is generated and logged once.
pub async fn ensure_admin_user(state: &AppState) -> anyhow::Result<()> {
    if User::admin_exists(&state.db).await? {
        return Ok(());
    }

    let auth = &state.config.auth;
    let (password, generated) = match auth.admin_password.as_deref().filter(|p| !p.is_empty()) {
        Some(password) => (password.to_string(), false),
        None => (generate_token()[..16].to_string(), true),
    };
    let password_hash =
        hash_password(&password).map_err(|e| anyhow::anyhow!("Failed to hash admin password: {}", e))?;

    let email = auth.admin_email.trim().to_lowercase();
    if let Some(mut existing) = User::find_by_email(&state.db, &email).await? {
        existing.role = UserRole::Admin;
        existing.password_hash = password_hash;
        existing.save(&state.db).await?;
    } else {
        User::create(
            &state.db,
            NewUser {
                email: &email,
                password_hash: &password_hash,
                name: &auth.admin_name,
                role: UserRole::Admin,
                whatsapp: None,
            },
        )
        .await?;
    }

    if generated {
        tracing::warn!(
            email = %email,
            password = %password,
            "Created admin account with a generated password, change it after first login"
        );
    } else {
        tracing::info!(email = %email, "Created admin account");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_password_roundtrip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
        assert!(!verify_password("correct horse", "not-a-hash"));
    }

    #[test]
    fn test_tokens_are_random_hex() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert_eq!(hash_token(&a), hash_token(&a));
        assert_ne!(hash_token(&a), a);
    }

    #[test]
    fn test_extract_token_requires_bearer() {
        let mut headers = HeaderMap::new();
        assert!(extract_token(&headers).is_none());

        headers.insert("Authorization", HeaderValue::from_static("Basic abc"));
        assert!(extract_token(&headers).is_none());

        headers.insert("Authorization", HeaderValue::from_static("Bearer abc123"));
        assert_eq!(extract_token(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn test_client_ip_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(extract_client_ip(&headers).as_deref(), Some("10.0.0.2"));

        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9, 10.0.0.1"));
        assert_eq!(extract_client_ip(&headers).as_deref(), Some("203.0.113.9"));
    }
}
