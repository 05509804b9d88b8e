//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                 - Liveness
//! GET  /health/ready           - Readiness (identity store reachable)
//!
//! # Auth (rate limited)
//! POST /api/auth/register      - Create account, set session cookie
//! POST /api/auth/login         - Check credentials, set session cookie
//! POST /api/auth/logout        - Clear session cookie
//! GET  /api/auth/session       - Current session, if any
//!
//! # Account (requires session)
//! GET  /api/account            - Identity and subscription
//! POST /api/account/usage      - Meter one generation
//! ```

pub mod account;
pub mod auth;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::middleware::{auth_rate_limiter, request_id_middleware};
use crate::state::AppState;

/// Create the auth routes router.
///
/// Login and registration are rate limited per client IP.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .layer(auth_rate_limiter())
        .route("/logout", post(auth::logout))
        .route("/session", get(auth::session))
}

/// Create the account routes router.
pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(account::index))
        .route("/usage", post(account::record_usage))
}

/// Create all routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .nest("/api/auth", auth_routes())
        .nest("/api/account", account_routes())
}

/// Build the complete application with middleware and state.
pub fn app(state: AppState) -> Router {
    routes()
        .layer(axum_middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
            tracing::info_span!(
                "request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = tracing::field::Empty,
            )
        }))
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the identity store is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.reconciler().ping_store().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
