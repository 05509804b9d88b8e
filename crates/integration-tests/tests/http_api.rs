//! Integration tests for the JSON API, driven through the full router.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{HeaderMap, Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt;

use callready_core::UserId;
use callready_integration_tests::{InstrumentedStore, TestContext, codec, email, test_config};
use callready_server::routes;
use callready_server::state::AppState;

struct TestApp {
    router: Router,
    store: Arc<InstrumentedStore>,
}

impl TestApp {
    fn new() -> Self {
        let store = Arc::new(InstrumentedStore::new());
        let state = AppState::new(test_config(), store.clone()).unwrap();
        Self {
            router: routes::app(state),
            store,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, headers, body)
    }

    /// POST a JSON body from the given client address.
    async fn post_json(
        &self,
        path: &str,
        client_ip: &str,
        body: &Value,
    ) -> (StatusCode, HeaderMap, Value) {
        let request = Request::post(path)
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-forwarded-for", client_ip)
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    async fn register(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> (StatusCode, HeaderMap, Value) {
        self.post_json(
            "/api/auth/register",
            "203.0.113.10",
            &json!({ "email": email, "password": password, "display_name": name }),
        )
        .await
    }

    async fn login(&self, email: &str, password: &str) -> (StatusCode, HeaderMap, Value) {
        self.post_json(
            "/api/auth/login",
            "203.0.113.20",
            &json!({ "email": email, "password": password }),
        )
        .await
    }

    async fn get_with_cookie(
        &self,
        path: &str,
        cookie: Option<&str>,
    ) -> (StatusCode, HeaderMap, Value) {
        let mut builder = Request::get(path);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    async fn post_with_cookie(&self, path: &str, cookie: &str) -> (StatusCode, HeaderMap, Value) {
        let request = Request::post(path)
            .header(header::COOKIE, cookie)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }
}

/// The `cr_session=<token>` pair from a response's Set-Cookie header.
fn session_cookie(headers: &HeaderMap) -> String {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find(|value| value.starts_with("cr_session="))
        .and_then(|value| value.split(';').next())
        .map(str::to_owned)
        .unwrap()
}

/// A correctly signed session cookie that expired a millisecond ago.
fn expired_session_cookie() -> String {
    let expires_at = chrono::Utc::now().timestamp_millis() - 1;
    let token = codec().encode_expiring_at(UserId::generate(), &email("a@x.com"), "Avery", expires_at);
    format!("cr_session={}", token.as_str())
}

fn set_cookie_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find(|value| value.starts_with("cr_session="))
        .map(str::to_owned)
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_is_ok_even_when_store_is_down() {
    let app = TestApp::new();
    app.store.set_down(true);

    let (status, _, body) = app.get_with_cookie("/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("ok".to_owned()));
}

#[tokio::test]
async fn test_readiness_follows_store() {
    let app = TestApp::new();
    let (status, _, _) = app.get_with_cookie("/health/ready", None).await;
    assert_eq!(status, StatusCode::OK);

    app.store.set_down(true);
    let (status, _, _) = app.get_with_cookie("/health/ready", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

// =============================================================================
// Registration
// =============================================================================

#[tokio::test]
async fn test_register_sets_session_cookie() {
    let app = TestApp::new();
    let (status, headers, body) = app.register("New@X.com", "pw-new-12345", "Newt").await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["email"], "new@x.com");
    assert_eq!(body["display_name"], "Newt");
    assert!(body["id"].is_string());

    let set_cookie = set_cookie_header(&headers).unwrap();
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("SameSite=Lax"));
    assert!(set_cookie.contains("Path=/"));
}

#[tokio::test]
async fn test_register_blank_name_defaults_to_local_part() {
    let app = TestApp::new();
    let (status, _, body) = app.register("jordan@x.com", "pw-jordan-1", "  ").await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["display_name"], "jordan");
}

#[tokio::test]
async fn test_register_duplicate_is_conflict() {
    let app = TestApp::new();
    app.register("b@x.com", "pw-b-123456", "Blake").await;

    let (status, headers, body) = app.register("b@x.com", "pw-b-123456", "Blake").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body, json!({ "error": "User already exists" }));
    assert!(set_cookie_header(&headers).is_none());
}

#[tokio::test]
async fn test_register_weak_password_is_bad_request() {
    let app = TestApp::new();
    let (status, _, body) = app.register("b@x.com", "short", "Blake").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("at least 8"));
    assert!(
        app.store
            .peek(&callready_integration_tests::email("b@x.com"))
            .await
            .is_none()
    );
}

#[tokio::test]
async fn test_register_invalid_email_is_bad_request() {
    let app = TestApp::new();
    let (status, _, _) = app.register("not-an-email", "pw-b-123456", "Blake").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// =============================================================================
// Login
// =============================================================================

#[tokio::test]
async fn test_login_after_register() {
    let app = TestApp::new();
    let (_, _, registered) = app.register("b@x.com", "pw-b-123456", "Blake").await;

    let (status, headers, body) = app.login("b@x.com", "pw-b-123456").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], registered["id"]);
    assert!(session_cookie(&headers).starts_with("cr_session="));
}

#[tokio::test]
async fn test_login_failures_are_indistinguishable() {
    let app = TestApp::new();
    app.register("b@x.com", "pw-b-123456", "Blake").await;

    let wrong_password = app.login("b@x.com", "wrongpw").await;
    let unknown_email = app.login("nobody@x.com", "pw-b-123456").await;
    let malformed_email = app.login("nobody", "pw-b-123456").await;

    for (status, headers, body) in [wrong_password, unknown_email, malformed_email] {
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({ "error": "Invalid email or password" }));
        assert!(set_cookie_header(&headers).is_none());
    }
}

#[tokio::test]
async fn test_login_during_outage_looks_like_bad_credentials() {
    let app = TestApp::new();
    app.store.set_down(true);

    let (status, _, body) = app.login("a@x.com", "pw1-long-enough").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "error": "Invalid email or password" }));
}

#[tokio::test]
async fn test_login_for_user_created_out_of_band() {
    let app = TestApp::new();
    let ctx = TestContext::new();
    let user = ctx.user("a@x.com", "pw1-long-enough", "Avery");
    app.store.seed(&user).await;

    let (status, _, body) = app.login("a@x.com", "pw1-long-enough").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], user.id.to_string());
    assert_eq!(body["display_name"], "Avery");
}

// =============================================================================
// Session
// =============================================================================

#[tokio::test]
async fn test_session_endpoint() {
    let app = TestApp::new();

    let (status, _, body) = app.get_with_cookie("/api/auth/session", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "authenticated": false }));

    let (_, headers, registered) = app.register("b@x.com", "pw-b-123456", "Blake").await;
    let cookie = session_cookie(&headers);

    let (status, _, body) = app
        .get_with_cookie("/api/auth/session", Some(&cookie))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["authenticated"], true);
    assert_eq!(body["user"]["id"], registered["id"]);
}

#[tokio::test]
async fn test_session_with_expired_cookie_clears_it() {
    let app = TestApp::new();
    let cookie = expired_session_cookie();

    let (status, headers, body) = app.get_with_cookie("/api/auth/session", Some(&cookie)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "authenticated": false }));

    let cleared = set_cookie_header(&headers).unwrap();
    assert!(cleared.starts_with("cr_session=;"));
    assert!(cleared.contains("Max-Age=0"));
}

#[tokio::test]
async fn test_session_with_forged_cookie_clears_it() {
    let app = TestApp::new();

    let (status, headers, body) = app
        .get_with_cookie("/api/auth/session", Some("cr_session=eyJ1aWQiOiJ4In0.00"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["authenticated"], false);
    assert!(set_cookie_header(&headers).unwrap().contains("Max-Age=0"));
}

#[tokio::test]
async fn test_session_with_valid_cookie_keeps_it() {
    let app = TestApp::new();
    let (_, headers, _) = app.register("b@x.com", "pw-b-123456", "Blake").await;
    let cookie = session_cookie(&headers);

    let (_, headers, _) = app.get_with_cookie("/api/auth/session", Some(&cookie)).await;
    assert!(set_cookie_header(&headers).is_none());
}

#[tokio::test]
async fn test_logout_clears_cookie() {
    let app = TestApp::new();
    let (_, headers, _) = app.register("b@x.com", "pw-b-123456", "Blake").await;
    let cookie = session_cookie(&headers);

    let (status, headers, _) = app.post_with_cookie("/api/auth/logout", &cookie).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let cleared = set_cookie_header(&headers).unwrap();
    assert!(cleared.starts_with("cr_session=;"));
    assert!(cleared.contains("Max-Age=0"));
}

// =============================================================================
// Account
// =============================================================================

#[tokio::test]
async fn test_account_requires_session() {
    let app = TestApp::new();
    let (status, headers, body) = app.get_with_cookie("/api/account", None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "error": "Authentication required" }));
    assert!(set_cookie_header(&headers).is_none());
}

#[tokio::test]
async fn test_account_with_tampered_cookie_is_rejected_and_cleared() {
    let app = TestApp::new();
    let (_, headers, _) = app.register("b@x.com", "pw-b-123456", "Blake").await;
    let cookie = session_cookie(&headers);
    let tampered = format!("{cookie}00");

    let (status, headers, _) = app.get_with_cookie("/api/account", Some(&tampered)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(set_cookie_header(&headers).unwrap().contains("Max-Age=0"));
}

#[tokio::test]
async fn test_account_with_expired_cookie_is_rejected_and_cleared() {
    let app = TestApp::new();
    let cookie = expired_session_cookie();

    let (status, headers, body) = app.get_with_cookie("/api/account", Some(&cookie)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "error": "Authentication required" }));

    let cleared = set_cookie_header(&headers).unwrap();
    assert!(cleared.starts_with("cr_session=;"));
    assert!(cleared.contains("Max-Age=0"));
}

#[tokio::test]
async fn test_account_shows_identity_and_subscription() {
    let app = TestApp::new();
    let (_, headers, registered) = app.register("b@x.com", "pw-b-123456", "Blake").await;
    let cookie = session_cookie(&headers);

    let (status, _, body) = app.get_with_cookie("/api/account", Some(&cookie)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["id"], registered["id"]);
    assert_eq!(body["user"]["email"], "b@x.com");
    assert_eq!(body["subscription"]["plan"], "free");
    assert_eq!(body["subscription"]["status"], "active");
    assert_eq!(body["subscription"]["usage_count"], 0);
    assert_eq!(body["subscription"]["usage_limit"], 5);
}

#[tokio::test]
async fn test_account_survives_store_outage() {
    let app = TestApp::new();
    let (_, headers, registered) = app.register("b@x.com", "pw-b-123456", "Blake").await;
    let cookie = session_cookie(&headers);

    app.store.set_down(true);
    let (status, _, body) = app.get_with_cookie("/api/account", Some(&cookie)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["id"], registered["id"]);
    assert!(body.get("subscription").is_none());
}

#[tokio::test]
async fn test_usage_is_metered_until_limit() {
    let app = TestApp::new();
    let (_, headers, _) = app.register("b@x.com", "pw-b-123456", "Blake").await;
    let cookie = session_cookie(&headers);

    for expected in 1..=5 {
        let (status, _, body) = app.post_with_cookie("/api/account/usage", &cookie).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "usage_count": expected, "usage_limit": 5 }));
    }

    let (status, _, body) = app.post_with_cookie("/api/account/usage", &cookie).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert!(body["error"].as_str().unwrap().contains("limit"));
}

#[tokio::test]
async fn test_usage_during_outage_is_service_unavailable() {
    let app = TestApp::new();
    let (_, headers, _) = app.register("b@x.com", "pw-b-123456", "Blake").await;
    let cookie = session_cookie(&headers);

    app.store.set_down(true);
    let (status, _, body) = app.post_with_cookie("/api/account/usage", &cookie).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, json!({ "error": "Service temporarily unavailable" }));
}
