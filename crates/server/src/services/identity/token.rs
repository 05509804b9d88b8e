//! Session token codec.
//!
//! A token is `base64url(json claims) "." hex(HMAC-SHA256(secret, payload))`.
//! The claims are readable by anyone holding the token; the signature only
//! stops the client from forging or editing them.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

use callready_core::{Email, UserId};

use super::error::TokenError;
use crate::models::SessionClaims;

type HmacSha256 = Hmac<Sha256>;

/// Default validity window in hours (7 days).
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 7 * 24;

/// An encoded session token ready to be handed to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    value: String,
    claims: SessionClaims,
}

impl SessionToken {
    /// The opaque string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// The claims the token carries.
    #[must_use]
    pub const fn claims(&self) -> &SessionClaims {
        &self.claims
    }

    /// Consume the token, returning its string form.
    #[must_use]
    pub fn into_string(self) -> String {
        self.value
    }
}

/// Encodes and decodes signed session tokens.
#[derive(Clone)]
pub struct SessionCodec {
    secret: SecretString,
    validity: Duration,
}

impl std::fmt::Debug for SessionCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCodec")
            .field("secret", &"[REDACTED]")
            .field("validity", &self.validity)
            .finish()
    }
}

impl SessionCodec {
    /// Create a codec signing with `secret`, issuing tokens valid for `validity`.
    #[must_use]
    pub fn new(secret: SecretString, validity: Duration) -> Self {
        Self { secret, validity }
    }

    /// How long issued tokens stay valid.
    #[must_use]
    pub const fn validity(&self) -> Duration {
        self.validity
    }

    /// Issue a token expiring one validity window from now.
    #[must_use]
    pub fn encode(&self, user_id: UserId, email: &Email, display_name: &str) -> SessionToken {
        let expires_at = (Utc::now() + self.validity).timestamp_millis();
        self.encode_expiring_at(user_id, email, display_name, expires_at)
    }

    /// Issue a token with an explicit expiry (epoch millis).
    #[must_use]
    pub fn encode_expiring_at(
        &self,
        user_id: UserId,
        email: &Email,
        display_name: &str,
        expires_at: i64,
    ) -> SessionToken {
        let claims = SessionClaims {
            user_id,
            email: email.clone(),
            display_name: display_name.to_owned(),
            expires_at,
        };

        // Serializing a struct of strings and integers cannot fail.
        let json = serde_json::to_vec(&claims).unwrap_or_default();
        let payload = URL_SAFE_NO_PAD.encode(json);
        let signature = hex::encode(self.mac(&payload).finalize().into_bytes());

        SessionToken {
            value: format!("{payload}.{signature}"),
            claims,
        }
    }

    /// Decode and verify a token against the current time.
    ///
    /// # Errors
    ///
    /// Returns a `TokenError` if the token is malformed, forged, or expired.
    pub fn decode(&self, token: &str) -> Result<SessionClaims, TokenError> {
        self.decode_at(token, Utc::now().timestamp_millis())
    }

    /// Decode and verify a token as of `now_ms` (epoch millis).
    ///
    /// # Errors
    ///
    /// Returns a `TokenError` if the token is malformed, forged, or expired
    /// at `now_ms`.
    pub fn decode_at(&self, token: &str, now_ms: i64) -> Result<SessionClaims, TokenError> {
        let (payload, signature) = token.split_once('.').ok_or(TokenError::Malformed)?;
        let signature = hex::decode(signature).map_err(|_| TokenError::Malformed)?;

        self.mac(payload)
            .verify_slice(&signature)
            .map_err(|_| TokenError::InvalidSignature)?;

        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| TokenError::Malformed)?;
        let claims: SessionClaims =
            serde_json::from_slice(&json).map_err(|_| TokenError::Malformed)?;

        if claims.is_expired_at(now_ms) {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    fn mac(&self, payload: &str) -> HmacSha256 {
        // HMAC accepts keys of any length.
        let mut mac = <HmacSha256 as Mac>::new_from_slice(self.secret.expose_secret().as_bytes())
            .unwrap_or_else(|_| unreachable!("HMAC-SHA256 accepts keys of any length"));
        mac.update(payload.as_bytes());
        mac
    }
}
