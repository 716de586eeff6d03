#![allow(dead_code)]

use std::sync::Arc;

use alem_api::config::ServerConfig;
use alem_api::router::build_app_router;
use alem_api::state::AppState;
use alem_core::auth::AuthService;
use alem_core::config::AuthConfig;
use alem_core::otp::RecordingDelivery;
use alem_core::roles::Role;
use alem_core::store::memory::{MemoryIdentityStore, MemoryOtpStore, MemorySessionStore};
use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{Request, Response};
use axum::Router;
use chrono::Duration;
use http_body_util::BodyExt;
use tower::ServiceExt;
use uuid::Uuid;

pub const ACCESS_SECRET: &str = "api-test-access-secret";
pub const REFRESH_SECRET: &str = "api-test-refresh-secret";

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    let mut auth = AuthConfig::new(ACCESS_SECRET);
    auth.refresh_secret = REFRESH_SECRET.into();
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        database_url: String::new(),
        db_max_connections: 1,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        auth,
    }
}

/// A router over in-memory stores plus handles for inspecting them.
pub struct TestApp {
    pub router: Router,
    pub auth: Arc<AuthService>,
    pub delivery: Arc<RecordingDelivery>,
    pub sessions: Arc<MemorySessionStore>,
}

impl TestApp {
    /// A fresh router sharing this app's stores. `oneshot` consumes routers,
    /// so call this once per request.
    pub fn app(&self) -> Router {
        self.router.clone()
    }

    /// Mint an access token directly, bypassing login.
    pub fn access_token(&self, user_id: Uuid, role: Role) -> String {
        self.auth
            .tokens()
            .sign(user_id, role, ACCESS_SECRET, Duration::minutes(5))
            .unwrap()
    }
}

/// Build the full application router with all middleware layers over
/// in-memory stores.
///
/// Uses the same [`build_app_router`] as `main.rs`, so tests exercise the
/// production middleware stack.
pub fn build_test_app() -> TestApp {
    let config = test_config();
    let delivery = Arc::new(RecordingDelivery::new());
    let sessions = Arc::new(MemorySessionStore::new());
    let auth = Arc::new(AuthService::new(
        Arc::new(MemoryIdentityStore::new()),
        sessions.clone(),
        Arc::new(MemoryOtpStore::new()),
        delivery.clone(),
        config.auth.clone(),
    ));

    let state = AppState {
        pool: None,
        config: Arc::new(config.clone()),
        auth: auth.clone(),
    };

    TestApp {
        router: build_app_router(state, &config),
        auth,
        delivery,
        sessions,
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn get_auth(app: Router, uri: &str, token: &str) -> Response<Body> {
    let request = Request::builder()
        .uri(uri)
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .header("user-agent", "api-test")
        .header("x-forwarded-for", "203.0.113.9")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json_auth(
    app: Router,
    uri: &str,
    body: serde_json::Value,
    token: &str,
) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
