//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `CALLREADY_BASE_URL` - Public URL for the API (https enables `Secure` cookies)
//! - `CALLREADY_SESSION_SECRET` - Session token signing secret (min 32 chars, high entropy)
//!
//! ## Optional
//! - `CALLREADY_DATABASE_URL` - `PostgreSQL` connection string (falls back to
//!   `DATABASE_URL`; without either the server keeps identities in memory)
//! - `CALLREADY_HOST` - Bind address (default: 127.0.0.1)
//! - `CALLREADY_PORT` - Listen port (default: 3000)
//! - `CALLREADY_SESSION_TTL_HOURS` - Session token validity, 1 to 8760 (default: 168)
//! - `CALLREADY_STORE_TIMEOUT_MS` - Bound on each identity store call (default: 3000)
//! - `CALLREADY_ARGON2_MEMORY_KIB` - Argon2 memory cost (default: 19456)
//! - `CALLREADY_ARGON2_ITERATIONS` - Argon2 passes (default: 2)
//! - `CALLREADY_ARGON2_PARALLELISM` - Argon2 lanes (default: 1)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment tag
//! - `SENTRY_SAMPLE_RATE` - Error event sample rate (default: 1.0)
//! - `SENTRY_TRACES_SAMPLE_RATE` - Transaction sample rate (default: 0.0)

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

use crate::services::identity::{Argon2Settings, DEFAULT_SESSION_TTL_HOURS};

const MIN_SESSION_SECRET_LENGTH: usize = 32;
/// One year.
const MAX_SESSION_TTL_HOURS: i64 = 365 * 24;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `PostgreSQL` connection URL (contains password). `None` selects the
    /// in-memory identity store.
    pub database_url: Option<SecretString>,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL
    pub base_url: String,
    /// Session token signing secret
    pub session_secret: SecretString,
    /// Session token validity window
    pub session_ttl: chrono::Duration,
    /// Bound on each identity store call
    pub store_timeout: Duration,
    /// Password hashing cost
    pub argon2: Argon2Settings,
    /// Error tracking
    pub sentry: SentryConfig,
}

/// Sentry error tracking configuration.
#[derive(Debug, Clone, Default)]
pub struct SentryConfig {
    pub dsn: Option<String>,
    pub environment: Option<String>,
    pub sample_rate: f32,
    pub traces_sample_rate: f32,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("CALLREADY_DATABASE_URL");
        let host = get_parsed_or_default::<IpAddr>("CALLREADY_HOST", "127.0.0.1")?;
        let port = get_parsed_or_default::<u16>("CALLREADY_PORT", "3000")?;
        let base_url = get_required_env("CALLREADY_BASE_URL")?;
        url::Url::parse(&base_url).map_err(|e| {
            ConfigError::InvalidEnvVar("CALLREADY_BASE_URL".to_string(), e.to_string())
        })?;

        let session_secret = get_validated_secret("CALLREADY_SESSION_SECRET")?;
        validate_session_secret(&session_secret, "CALLREADY_SESSION_SECRET")?;

        let session_ttl = session_ttl_from_hours(get_parsed_or_default::<i64>(
            "CALLREADY_SESSION_TTL_HOURS",
            &DEFAULT_SESSION_TTL_HOURS.to_string(),
        )?)?;
        let store_timeout_ms = get_parsed_or_default::<u64>("CALLREADY_STORE_TIMEOUT_MS", "3000")?;

        let defaults = Argon2Settings::default();
        let argon2 = Argon2Settings {
            memory_kib: get_parsed_or_default(
                "CALLREADY_ARGON2_MEMORY_KIB",
                &defaults.memory_kib.to_string(),
            )?,
            iterations: get_parsed_or_default(
                "CALLREADY_ARGON2_ITERATIONS",
                &defaults.iterations.to_string(),
            )?,
            parallelism: get_parsed_or_default(
                "CALLREADY_ARGON2_PARALLELISM",
                &defaults.parallelism.to_string(),
            )?,
        };

        let sentry = SentryConfig {
            dsn: get_optional_env("SENTRY_DSN"),
            environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sample_rate: get_parsed_or_default("SENTRY_SAMPLE_RATE", "1.0")?,
            traces_sample_rate: get_parsed_or_default("SENTRY_TRACES_SAMPLE_RATE", "0.0")?,
        };

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            session_secret,
            session_ttl,
            store_timeout: Duration::from_millis(store_timeout_ms),
            argon2,
            sentry,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether cookies must carry the `Secure` attribute.
    #[must_use]
    pub fn secure_cookies(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Option<SecretString> {
    std::env::var(primary_key)
        .or_else(|_| std::env::var("DATABASE_URL"))
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(SecretString::from)
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, falling back to `default` when unset.
fn get_parsed_or_default<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Validate that a session secret meets minimum length requirements.
fn validate_session_secret(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_SESSION_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_SESSION_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

/// Validate a session lifetime given in hours.
fn session_ttl_from_hours(hours: i64) -> Result<chrono::Duration, ConfigError> {
    if !(1..=MAX_SESSION_TTL_HOURS).contains(&hours) {
        return Err(ConfigError::InvalidEnvVar(
            "CALLREADY_SESSION_TTL_HOURS".to_string(),
            format!("must be between 1 and {MAX_SESSION_TTL_HOURS}, got {hours}"),
        ));
    }
    Ok(chrono::Duration::hours(hours))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn config(base_url: &str) -> ServerConfig {
        ServerConfig {
            database_url: None,
            host: "127.0.0.1".parse().unwrap(),
            port: 3000,
            base_url: base_url.to_string(),
            session_secret: SecretString::from("x".repeat(32)),
            session_ttl: chrono::Duration::hours(DEFAULT_SESSION_TTL_HOURS),
            store_timeout: Duration::from_millis(3000),
            argon2: Argon2Settings::minimal(),
            sentry: SentryConfig::default(),
        }
    }

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_single_char() {
        // All same character = 0 entropy
        assert!((shannon_entropy("aaaaaaa") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_high() {
        let entropy = shannon_entropy("aB3$xY9!mK2@nL5#");
        assert!(entropy > 3.3);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-session-key-goes-here-please", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        let result = validate_secret_strength("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6", "TEST_VAR");
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_session_secret_length() {
        assert!(validate_session_secret(&SecretString::from("short"), "TEST_SESSION").is_err());
        assert!(validate_session_secret(&SecretString::from("a".repeat(32)), "TEST_SESSION").is_ok());
    }

    #[test]
    fn test_parsed_or_default_uses_default_when_unset() {
        let port: u16 = get_parsed_or_default("CALLREADY_TEST_UNSET_PORT", "3000").unwrap();
        assert_eq!(port, 3000);

        let bad = get_parsed_or_default::<u16>("CALLREADY_TEST_UNSET_PORT", "not-a-port");
        assert!(matches!(bad, Err(ConfigError::InvalidEnvVar(_, _))));
    }

    #[test]
    fn test_session_ttl_bounds() {
        assert_eq!(
            session_ttl_from_hours(DEFAULT_SESSION_TTL_HOURS).unwrap(),
            chrono::Duration::days(7)
        );
        assert_eq!(
            session_ttl_from_hours(MAX_SESSION_TTL_HOURS).unwrap(),
            chrono::Duration::days(365)
        );

        for hours in [0, -1, MAX_SESSION_TTL_HOURS + 1, 3_000_000_000_000, i64::MAX] {
            assert!(
                matches!(
                    session_ttl_from_hours(hours),
                    Err(ConfigError::InvalidEnvVar(_, _))
                ),
                "{hours}"
            );
        }
    }

    #[test]
    fn test_socket_addr() {
        let addr = config("http://localhost:3000").socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 3000);
    }

    #[test]
    fn test_secure_cookies_follow_scheme() {
        assert!(!config("http://localhost:3000").secure_cookies());
        assert!(config("https://app.callready.ai").secure_cookies());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut config = config("http://localhost:3000");
        config.database_url = Some(SecretString::from("postgres://app:hunter2@db/callready"));
        let debug_output = format!("{config:?}");

        assert!(!debug_output.contains("hunter2"));
        assert!(!debug_output.contains(&"x".repeat(32)));
    }
}
