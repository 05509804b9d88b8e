//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.
//! Bodies are JSON: `{"error": "<message>"}`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::services::identity::{PasswordError, StoreError};

/// Message shown for every failed login, whatever the cause.
pub const INVALID_LOGIN_MESSAGE: &str = "Invalid email or password";

/// Application-level error type for the API.
#[derive(Debug, Error)]
pub enum AppError {
    /// Identity store operation failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Password hashing failed.
    #[error("Password error: {0}")]
    Password(#[from] PasswordError),

    /// Login failed. Covers unknown emails, wrong passwords and degraded
    /// service alike.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Registration for an email that is already taken.
    #[error("User already exists")]
    AlreadyExists,

    /// Password rejected by the registration policy.
    #[error("Weak password: {0}")]
    WeakPassword(String),

    /// Email failed validation.
    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    /// The subscription does not allow the action.
    #[error("Payment required: {0}")]
    PaymentRequired(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Password(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::AlreadyExists => StatusCode::CONFLICT,
            Self::WeakPassword(_) | Self::InvalidEmail(_) => StatusCode::BAD_REQUEST,
            Self::PaymentRequired(_) => StatusCode::PAYMENT_REQUIRED,
        }
    }

    fn client_message(&self) -> String {
        // Don't expose internal error details to clients
        match self {
            Self::Store(_) => "Service temporarily unavailable".to_string(),
            Self::Password(_) => "Internal server error".to_string(),
            Self::InvalidCredentials => INVALID_LOGIN_MESSAGE.to_string(),
            Self::AlreadyExists => "User already exists".to_string(),
            Self::WeakPassword(msg) | Self::PaymentRequired(msg) => msg.clone(),
            Self::InvalidEmail(_) => "Invalid email address".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if matches!(self, Self::Store(_) | Self::Password(_)) {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let status = self.status();
        let body = Json(json!({ "error": self.client_message() }));
        (status, body).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
pub fn add_breadcrumb(category: &str, message: &str) {
    sentry::add_breadcrumb(sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get_status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::InvalidEmail("missing @".to_string());
        assert_eq!(err.to_string(), "Invalid email: missing @");
        assert_eq!(AppError::AlreadyExists.to_string(), "User already exists");
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(get_status(AppError::InvalidCredentials), StatusCode::UNAUTHORIZED);
        assert_eq!(get_status(AppError::AlreadyExists), StatusCode::CONFLICT);
        assert_eq!(
            get_status(AppError::WeakPassword("too short".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(AppError::PaymentRequired("limit".to_string())),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            get_status(AppError::Store(StoreError::Unavailable("down".to_string()))),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            get_status(AppError::Password(PasswordError::Hash("rng".to_string()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let err = AppError::Store(StoreError::Unavailable("pg at 10.0.0.5 refused".to_string()));
        assert_eq!(err.client_message(), "Service temporarily unavailable");

        let err = AppError::Password(PasswordError::CorruptHash("bad phc".to_string()));
        assert_eq!(err.client_message(), "Internal server error");
    }

    #[test]
    fn test_login_failures_share_one_message() {
        assert_eq!(
            AppError::InvalidCredentials.client_message(),
            "Invalid email or password"
        );
    }
}
