//! Authentication extractors.
//!
//! A request is authenticated by the signed session token in its cookie and
//! nothing else: no cache or store lookup happens here.

use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use serde_json::json;

use super::session::{clear_session_cookie, session_token};
use crate::models::SessionClaims;
use crate::services::identity::SessionState;
use crate::state::AppState;

/// Extractor that requires a valid session.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(RequireAuth(claims): RequireAuth) -> impl IntoResponse {
///     format!("Hello, {}!", claims.display_name)
/// }
/// ```
pub struct RequireAuth(pub SessionClaims);

/// Error returned when a session is required but absent or invalid.
#[derive(Debug)]
pub enum AuthRejection {
    /// No session cookie.
    Unauthorized,
    /// A session cookie was sent but did not validate; it is cleared.
    InvalidSession,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": "Authentication required" }));
        match self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, body).into_response(),
            Self::InvalidSession => (
                StatusCode::UNAUTHORIZED,
                clear_session_cookie(CookieJar::new()),
                body,
            )
                .into_response(),
        }
    }
}

impl FromRequestParts<AppState> for RequireAuth {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = session_token(&jar).ok_or(AuthRejection::Unauthorized)?;

        match state.reconciler().validate_token(token) {
            SessionState::Authenticated(claims) => Ok(Self(claims)),
            SessionState::Anonymous => Err(AuthRejection::InvalidSession),
        }
    }
}

/// Extractor that optionally gets the current session.
///
/// Unlike `RequireAuth`, this does not reject the request; an invalid token
/// reads as anonymous, with `rejected` set so the handler can clear it.
pub struct OptionalAuth {
    pub claims: Option<SessionClaims>,
    /// A session cookie was sent but did not validate.
    pub rejected: bool,
}

impl FromRequestParts<AppState> for OptionalAuth {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let Some(token) = session_token(&jar) else {
            return Ok(Self {
                claims: None,
                rejected: false,
            });
        };

        Ok(match state.reconciler().validate_token(token) {
            SessionState::Authenticated(claims) => Self {
                claims: Some(claims),
                rejected: false,
            },
            SessionState::Anonymous => Self {
                claims: None,
                rejected: true,
            },
        })
    }
}
