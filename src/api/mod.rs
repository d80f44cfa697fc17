mod admin;
pub mod auth;
pub mod error;
pub mod extract;
mod media;
pub mod metrics;
mod requests;
mod settings;
mod users;
pub mod validation;

#[cfg(test)]
mod tests;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Auth routes (public)
    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/register", post(auth::register));

    // Session routes stay reachable while the platform is disabled
    let session_routes = Router::new()
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me).put(auth::update_me));

    // Protected API routes
    let api_routes = Router::new()
        // Own requests
        .route(
            "/requests",
            get(requests::list_requests).post(requests::create_request),
        )
        .route(
            "/requests/:id",
            get(requests::get_request)
                .put(requests::update_request)
                .delete(requests::delete_request),
        )
        // Media lookup
        .route("/media/search", get(media::search))
        // Admin
        .route(
            "/admin/requests",
            get(admin::list_requests).delete(admin::delete_all_requests),
        )
        .route("/admin/requests/:id", put(admin::update_request_status))
        .route("/admin/metrics", get(admin::request_summary))
        .route("/admin/online-users", get(admin::online_users))
        .route("/admin/access-logs", get(admin::access_logs))
        .route(
            "/admin/settings",
            get(settings::get_settings).put(settings::update_settings),
        )
        .route("/admin/users", get(users::list_users).post(users::create_user))
        .route(
            "/admin/users/:id",
            put(users::update_user).delete(users::delete_user),
        )
        // Protected by auth and the platform switch
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics::metrics_endpoint))
        .route("/api/platform", get(settings::public_settings))
        .nest("/api/auth", auth_routes.merge(session_routes))
        .nest("/api", api_routes)
        .layer(middleware::from_fn(metrics::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
