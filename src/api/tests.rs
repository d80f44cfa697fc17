//! Router-level scenarios against an in-memory database.

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use super::auth::hash_password;
use super::create_router;
use crate::config::Config;
use crate::db::{test_pool, MediaRequest, NewUser, UpdateSettingsRequest, User, UserRole};
use crate::notifications::testing::{notifier_with, RecordingGateway};
use crate::AppState;

const PASSWORD: &str = "secret123";

struct TestApp {
    router: Router,
    state: Arc<AppState>,
    gateway: Arc<RecordingGateway>,
}

async fn app() -> TestApp {
    let db = test_pool().await;
    let gateway = Arc::new(RecordingGateway::default());
    let notifier = Arc::new(notifier_with(gateway.clone()));
    let state = Arc::new(AppState::with_notifier(Config::default(), db, notifier));

    state
        .settings
        .update(&UpdateSettingsRequest {
            request_limit_per_day: Some(10),
            request_limit_per_week: Some(50),
            whatsapp_enabled: Some(true),
            twilio_account_sid: Some("AC0123456789abcdef".to_string()),
            twilio_auth_token: Some("token".to_string()),
            twilio_phone_number: Some("+14155238886".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    TestApp {
        router: create_router(state.clone()),
        state,
        gateway,
    }
}

impl TestApp {
    async fn user(&self, email: &str, role: UserRole) -> User {
        let hash = hash_password(PASSWORD).unwrap();
        User::create(
            &self.state.db,
            NewUser {
                email,
                password_hash: &hash,
                name: "Test User",
                role,
                whatsapp: None,
            },
        )
        .await
        .unwrap()
    }

    async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    async fn login(&self, email: &str) -> String {
        let (status, body) = self
            .call(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({"email": email, "password": PASSWORD})),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        body["token"].as_str().unwrap().to_string()
    }
}

fn submission(title: &str, notify: bool) -> Value {
    json!({
        "type": "add",
        "media_id": 348,
        "media_type": "movie",
        "media_title": title,
        "media_poster": "/alien.jpg",
        "notify_whatsapp": notify,
        "contact_number": "5511999999999"
    })
}

#[tokio::test]
async fn test_first_submission_is_created_pending() {
    let app = app().await;
    app.user("ana@example.com", UserRole::User).await;
    let token = app.login("ana@example.com").await;

    let (status, body) = app
        .call(Method::POST, "/api/requests", Some(&token), Some(submission("Alien", false)))
        .await;

    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["type"], "add");
    assert_eq!(body["media_title"], "Alien");
}

#[tokio::test]
async fn test_quota_denial_names_the_window() {
    let app = app().await;
    app.state
        .settings
        .update(&UpdateSettingsRequest {
            request_limit_per_day: Some(1),
            ..Default::default()
        })
        .await
        .unwrap();
    app.user("ana@example.com", UserRole::User).await;
    let token = app.login("ana@example.com").await;

    let (status, _) = app
        .call(Method::POST, "/api/requests", Some(&token), Some(submission("Alien", false)))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .call(Method::POST, "/api/requests", Some(&token), Some(submission("Aliens", false)))
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["details"]["window"], "daily");
    assert_eq!(body["error"]["details"]["limit"], 1);
}

#[tokio::test]
async fn test_completed_notification_reaches_normalized_number() {
    let app = app().await;
    app.user("ana@example.com", UserRole::User).await;
    app.user("admin@example.com", UserRole::Admin).await;
    let user_token = app.login("ana@example.com").await;
    let admin_token = app.login("admin@example.com").await;

    let (_, created) = app
        .call(Method::POST, "/api/requests", Some(&user_token), Some(submission("Alien", true)))
        .await;
    let id = created["id"].as_str().unwrap();

    let (status, body) = app
        .call(
            Method::PUT,
            &format!("/api/admin/requests/{}", id),
            Some(&admin_token),
            Some(json!({"status": "completed"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["status"], "completed");

    // Delivery runs on a background task
    let mut sent = Vec::new();
    for _ in 0..50 {
        sent = app.gateway.sent.lock().clone();
        if !sent.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "+5511999999999");
    assert!(sent[0].1.contains("Alien"));
    assert!(sent[0].1.contains("concluída"));
}

#[tokio::test]
async fn test_stranger_cannot_delete_request() {
    let app = app().await;
    app.user("owner@example.com", UserRole::User).await;
    app.user("other@example.com", UserRole::User).await;
    let owner_token = app.login("owner@example.com").await;
    let other_token = app.login("other@example.com").await;

    let (_, created) = app
        .call(Method::POST, "/api/requests", Some(&owner_token), Some(submission("Alien", false)))
        .await;
    let id = created["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .call(Method::DELETE, &format!("/api/requests/{}", id), Some(&other_token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["message"], "Not authorized");

    let (status, _) = app
        .call(Method::GET, &format!("/api/requests/{}", id), Some(&other_token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .call(Method::DELETE, "/api/requests/missing", Some(&other_token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    assert!(MediaRequest::find_by_id(&app.state.db, &id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_second_login_ends_first_session() {
    let app = app().await;
    app.user("ana@example.com", UserRole::User).await;
    let first = app.login("ana@example.com").await;
    let second = app.login("ana@example.com").await;

    let (status, _) = app.call(Method::GET, "/api/auth/me", Some(&first), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app.call(Method::GET, "/api/auth/me", Some(&second), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "ana@example.com");
    assert!(body.get("password_hash").is_none());
}

#[tokio::test]
async fn test_disabled_platform_blocks_users_only() {
    let app = app().await;
    app.state
        .settings
        .update(&UpdateSettingsRequest {
            platform_enabled: Some(false),
            disabled_message: Some("Back soon".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    app.user("ana@example.com", UserRole::User).await;
    app.user("admin@example.com", UserRole::Admin).await;
    let user_token = app.login("ana@example.com").await;
    let admin_token = app.login("admin@example.com").await;

    let (status, body) = app.call(Method::GET, "/api/requests", Some(&user_token), None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["message"], "Back soon");

    let (status, _) = app
        .call(Method::GET, "/api/admin/requests", Some(&admin_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.call(Method::GET, "/api/platform", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["platform_enabled"], false);
}

#[tokio::test]
async fn test_admin_endpoints_reject_users() {
    let app = app().await;
    app.user("ana@example.com", UserRole::User).await;
    let token = app.login("ana@example.com").await;

    let (status, _) = app.call(Method::GET, "/api/admin/settings", Some(&token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.call(Method::GET, "/api/requests", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_bulk_delete_requires_confirmation() {
    let app = app().await;
    app.user("ana@example.com", UserRole::User).await;
    app.user("admin@example.com", UserRole::Admin).await;
    let user_token = app.login("ana@example.com").await;
    let admin_token = app.login("admin@example.com").await;

    app.call(Method::POST, "/api/requests", Some(&user_token), Some(submission("Alien", false)))
        .await;

    let (status, _) = app
        .call(Method::DELETE, "/api/admin/requests", Some(&admin_token), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let uri = format!("/api/admin/requests?confirm={}", super::admin::DELETE_ALL_CONFIRMATION);
    let (status, body) = app.call(Method::DELETE, &uri, Some(&admin_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], 1);
}

#[tokio::test]
async fn test_register_respects_switch_and_uniqueness() {
    let app = app().await;
    let new_account = json!({
        "name": "Bruno",
        "email": "Bruno@Example.com",
        "password": PASSWORD
    });

    let (status, body) = app
        .call(Method::POST, "/api/auth/register", None, Some(new_account.clone()))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["role"], "user");
    assert_eq!(body["email"], "bruno@example.com");

    let (status, _) = app
        .call(Method::POST, "/api/auth/register", None, Some(new_account.clone()))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    app.state
        .settings
        .update(&UpdateSettingsRequest {
            registration_enabled: Some(false),
            ..Default::default()
        })
        .await
        .unwrap();
    let (status, _) = app
        .call(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({"name": "Caio", "email": "caio@example.com", "password": PASSWORD})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_incomplete_body_is_a_validation_error() {
    let app = app().await;
    app.user("ana@example.com", UserRole::User).await;
    let token = app.login("ana@example.com").await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/requests",
            Some(&token),
            Some(json!({"type": "add", "media_id": 1, "media_type": "movie"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
    assert_eq!(body["error"]["code"], "validation_error");
    assert!(body["error"]["details"]["body"].is_array());

    app.user("root@example.com", UserRole::Admin).await;
    let admin = app.login("root@example.com").await;
    let (status, body) = app
        .call(Method::GET, "/api/admin/requests?page=abc", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
    assert_eq!(body["error"]["code"], "validation_error");
}

#[tokio::test]
async fn test_access_logs_outlive_deleted_account() {
    let app = app().await;
    let ana = app.user("ana@example.com", UserRole::User).await;
    app.login("ana@example.com").await;
    app.user("root@example.com", UserRole::Admin).await;
    let admin = app.login("root@example.com").await;

    let (status, _) = app
        .call(Method::DELETE, &format!("/api/admin/users/{}", ana.id), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let kept: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM access_logs WHERE user_id = ?")
        .bind(&ana.id)
        .fetch_one(&app.state.db)
        .await
        .unwrap();
    assert_eq!(kept, 1);

    let (status, body) = app
        .call(
            Method::GET,
            &format!("/api/admin/access-logs?user_id={}", ana.id),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["total"], 1);
    assert_eq!(body["items"][0]["action"], "login");
    assert_eq!(body["items"][0]["user_name"], "Deleted account");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_submissions_respect_daily_limit() {
    let app = app().await;
    app.state
        .settings
        .update(&UpdateSettingsRequest {
            request_limit_per_day: Some(1),
            ..Default::default()
        })
        .await
        .unwrap();
    let ana = app.user("ana@example.com", UserRole::User).await;
    let token = app.login("ana@example.com").await;

    let handles: Vec<_> = (0..5)
        .map(|i| {
            let router = app.router.clone();
            let request = Request::builder()
                .method(Method::POST)
                .uri("/api/requests")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(submission(&format!("Alien {}", i), false).to_string()))
                .unwrap();
            tokio::spawn(async move { router.oneshot(request).await.unwrap().status() })
        })
        .collect();

    let mut statuses = Vec::new();
    for handle in handles {
        statuses.push(handle.await.unwrap());
    }

    let created = statuses.iter().filter(|s| **s == StatusCode::CREATED).count();
    let denied = statuses
        .iter()
        .filter(|s| **s == StatusCode::TOO_MANY_REQUESTS)
        .count();
    assert_eq!(created, 1, "{:?}", statuses);
    assert_eq!(denied, 4, "{:?}", statuses);
    let stored = MediaRequest::list_for_user(&app.state.db, &ana.id).await.unwrap();
    assert_eq!(stored.len(), 1);
}
