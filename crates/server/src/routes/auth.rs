//! Authentication route handlers.
//!
//! Registration, login and logout over JSON. A successful register or login
//! sets the `cr_session` cookie; every failed login answers with the same
//! 401 whatever the cause.

use axum::{Json, extract::State, http::StatusCode};
use axum_extra::extract::CookieJar;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use callready_core::{Email, UserId};

use crate::error::{AppError, Result, add_breadcrumb, clear_sentry_user, set_sentry_user};
use crate::middleware::{OptionalAuth, clear_session_cookie, set_session_cookie};
use crate::models::SessionClaims;
use crate::services::identity::{AuthOutcome, RegisterOutcome};
use crate::state::AppState;

// =============================================================================
// Request / Response Types
// =============================================================================

/// Login request body.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Registration request body.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub display_name: String,
}

/// The signed-in user, as returned to the client.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: UserId,
    pub email: Email,
    pub display_name: String,
}

impl From<SessionClaims> for UserResponse {
    fn from(claims: SessionClaims) -> Self {
        Self {
            id: claims.user_id,
            email: claims.email,
            display_name: claims.display_name,
        }
    }
}

/// Current session state.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserResponse>,
}

// =============================================================================
// Handlers
// =============================================================================

/// Create an account and sign it in.
#[instrument(skip(state, jar, body), fields(email = %body.email))]
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, CookieJar, Json<UserResponse>)> {
    let email = Email::parse(&body.email).map_err(|e| AppError::InvalidEmail(e.to_string()))?;

    let reconciler = state.reconciler();
    let (user_id, display_name) = match reconciler
        .register(&email, &body.password, &body.display_name)
        .await?
    {
        RegisterOutcome::Created {
            user_id,
            display_name,
        } => (user_id, display_name),
        RegisterOutcome::AlreadyExists => return Err(AppError::AlreadyExists),
        RegisterOutcome::WeakPassword(reason) => return Err(AppError::WeakPassword(reason)),
    };

    let token = reconciler.issue_token(user_id, &email, &display_name);
    let jar = set_session_cookie(jar, &token, state.config());

    set_sentry_user(&user_id, Some(email.as_str()));
    add_breadcrumb("auth", "Account created");

    Ok((
        StatusCode::CREATED,
        jar,
        Json(UserResponse {
            id: user_id,
            email,
            display_name,
        }),
    ))
}

/// Check credentials and start a session.
#[instrument(skip(state, jar, body), fields(email = %body.email))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> Result<(CookieJar, Json<UserResponse>)> {
    // A malformed email cannot belong to anyone; answer like any other miss.
    let email = Email::parse(&body.email).map_err(|_| AppError::InvalidCredentials)?;

    match state.reconciler().authenticate(&email, &body.password).await {
        AuthOutcome::Authenticated(user) => {
            let jar = set_session_cookie(jar, &user.token, state.config());
            set_sentry_user(&user.user_id, Some(user.email.as_str()));

            Ok((
                jar,
                Json(UserResponse {
                    id: user.user_id,
                    email: user.email,
                    display_name: user.display_name,
                }),
            ))
        }
        AuthOutcome::InvalidCredentials => Err(AppError::InvalidCredentials),
        AuthOutcome::ServiceDegraded => {
            tracing::error!("Login refused: identity store unreachable and no cached identity");
            Err(AppError::InvalidCredentials)
        }
    }
}

/// End the session by clearing its cookie.
pub async fn logout(jar: CookieJar) -> (StatusCode, CookieJar) {
    clear_sentry_user();
    (StatusCode::NO_CONTENT, clear_session_cookie(jar))
}

/// Report who the session cookie identifies, if anyone.
///
/// A cookie that fails validation (expired, forged or malformed) is cleared.
pub async fn session(jar: CookieJar, auth: OptionalAuth) -> (CookieJar, Json<SessionResponse>) {
    let jar = if auth.rejected {
        clear_session_cookie(jar)
    } else {
        jar
    };

    (
        jar,
        Json(SessionResponse {
            authenticated: auth.claims.is_some(),
            user: auth.claims.map(UserResponse::from),
        }),
    )
}
