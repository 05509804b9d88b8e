//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::services::identity::{
    IdentityStore, MemoryIdentityCache, PasswordError, PasswordHasher, Reconciler, SessionCodec,
};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like the reconciler and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ServerConfig,
    reconciler: Reconciler,
}

impl AppState {
    /// Create a new application state over `store` with an empty identity cache.
    ///
    /// # Errors
    ///
    /// Returns `PasswordError::Params` if the configured Argon2 cost is invalid.
    pub fn new(config: ServerConfig, store: Arc<dyn IdentityStore>) -> Result<Self, PasswordError> {
        let hasher = PasswordHasher::new(config.argon2)?;
        let codec = SessionCodec::new(config.session_secret.clone(), config.session_ttl);
        let reconciler = Reconciler::new(
            Arc::new(MemoryIdentityCache::new()),
            store,
            hasher,
            codec,
            config.store_timeout,
        );

        Ok(Self::from_parts(config, reconciler))
    }

    /// Assemble state from an already-built reconciler.
    #[must_use]
    pub fn from_parts(config: ServerConfig, reconciler: Reconciler) -> Self {
        Self {
            inner: Arc::new(AppStateInner { config, reconciler }),
        }
    }

    /// Get a reference to the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Get a reference to the identity reconciler.
    #[must_use]
    pub fn reconciler(&self) -> &Reconciler {
        &self.inner.reconciler
    }
}
