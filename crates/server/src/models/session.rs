//! Session-related types.
//!
//! Claims carried by the client-held session token.

use serde::{Deserialize, Serialize};

use callready_core::{Email, UserId};

/// Identity asserted by a session token.
///
/// Trusted at face value until `expires_at`; never re-validated against the
/// identity cache or store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    #[serde(rename = "uid")]
    pub user_id: UserId,
    pub email: Email,
    #[serde(rename = "name")]
    pub display_name: String,
    /// Expiry as milliseconds since the Unix epoch.
    #[serde(rename = "exp")]
    pub expires_at: i64,
}

impl SessionClaims {
    /// Whether the claims are expired at `now_ms` (epoch millis).
    #[must_use]
    pub const fn is_expired_at(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at
    }
}
