//! Identity error types.

use thiserror::Error;

/// Errors from an identity store adapter.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The durable backend could not be reached or did not answer in time.
    ///
    /// Recoverable: distinct from "not found", retried by the next request.
    #[error("identity store unavailable: {0}")]
    Unavailable(String),

    /// A record with the same email or ID already exists.
    #[error("identity already exists")]
    Conflict,

    /// A row could not be turned into a domain record.
    #[error("corrupt identity data: {0}")]
    Corrupt(String),
}

/// Errors from password hashing and verification.
#[derive(Debug, Error)]
pub enum PasswordError {
    /// The stored hash is not a valid PHC string.
    #[error("stored password hash is corrupt: {0}")]
    CorruptHash(String),

    /// Hashing a new password failed.
    #[error("password hashing failed: {0}")]
    Hash(String),

    /// The Argon2 cost parameters are invalid.
    #[error("invalid argon2 parameters: {0}")]
    Params(String),
}

/// Reasons a session token is rejected.
///
/// All variants mean "treat as anonymous and clear the cookie".
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    /// Not in `payload.signature` form, or the payload does not parse.
    #[error("malformed session token")]
    Malformed,

    /// The signature does not match the payload.
    #[error("session token signature mismatch")]
    InvalidSignature,

    /// The token's validity window has passed.
    #[error("session token expired")]
    Expired,
}
