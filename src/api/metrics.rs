//! Prometheus metrics endpoint and HTTP request tracking middleware.
//!
//! This module provides:
//! - A `/metrics` endpoint that returns Prometheus-formatted metrics
//! - Middleware for tracking HTTP request counts and durations
//! - Descriptions for the request, quota and notification counters

use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Instant;

use crate::db::MediaRequest;
use crate::AppState;

// Metric names as constants for consistency
pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
pub const REQUESTS_SUBMITTED_TOTAL: &str = "requests_submitted_total";
pub const REQUEST_STATUS_TRANSITIONS_TOTAL: &str = "request_status_transitions_total";
pub const REQUEST_QUOTA_DENIALS_TOTAL: &str = "request_quota_denials_total";
pub const NOTIFICATIONS_TOTAL: &str = "notifications_total";
pub const REQUESTS_BY_STATUS: &str = "requests_by_status";

/// Install the Prometheus recorder and return a handle for rendering.
///
/// Returns `None` when a recorder is already installed in this process.
pub fn init_metrics() -> Option<PrometheusHandle> {
    let handle = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => handle,
        Err(e) => {
            tracing::warn!("Failed to install Prometheus recorder: {}", e);
            return None;
        }
    };

    describe_counter!(
        HTTP_REQUESTS_TOTAL,
        "Total number of HTTP requests received"
    );
    describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_counter!(REQUESTS_SUBMITTED_TOTAL, "Content requests submitted by type");
    describe_counter!(
        REQUEST_STATUS_TRANSITIONS_TOTAL,
        "Request status changes by source and target status"
    );
    describe_counter!(
        REQUEST_QUOTA_DENIALS_TOTAL,
        "Submissions refused by the daily or weekly limit"
    );
    describe_counter!(NOTIFICATIONS_TOTAL, "WhatsApp notifications by outcome");
    describe_gauge!(REQUESTS_BY_STATUS, "Stored requests per status");

    Some(handle)
}

/// GET /metrics - Returns Prometheus-formatted metrics.
///
/// This endpoint is accessible without authentication.
pub async fn metrics_endpoint(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    update_gauge_metrics(&state).await;

    match state.metrics_handle.as_ref() {
        Some(h) => (StatusCode::OK, h.render()),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Metrics not initialized".to_string(),
        ),
    }
}

async fn update_gauge_metrics(state: &AppState) {
    match MediaRequest::status_summary(&state.db).await {
        Ok(summary) => {
            for (status, count) in [
                ("pending", summary.pending),
                ("in_progress", summary.in_progress),
                ("completed", summary.completed),
                ("rejected", summary.rejected),
            ] {
                gauge!(REQUESTS_BY_STATUS, "status" => status).set(count as f64);
            }
        }
        Err(e) => tracing::warn!("Failed to count requests for metrics: {}", e),
    }
}

/// Middleware to track HTTP request metrics.
///
/// Records:
/// - `http_requests_total` counter with method, path, and status labels
/// - `http_request_duration_seconds` histogram with method and path labels
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();

    // Matched path keeps ids out of the label set
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|mp| mp.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let method = request.method().to_string();

    let response = next.run(request).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path.clone(), "status" => status).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}
