//! Integration test support for CallReady.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p callready-integration-tests
//! ```
//!
//! No database is needed: the identity store is the in-memory one, wrapped
//! in [`InstrumentedStore`] so tests can count store calls and simulate
//! outages and slow responses.
//!
//! # Test Categories
//!
//! - `reconciler` - login and registration decisions across cache and store
//! - `session_token` - token issuance, expiry and tampering
//! - `http_api` - the JSON API driven through the axum router

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;

use callready_core::{Email, PlanTier, UserId};
use callready_server::config::{SentryConfig, ServerConfig};
use callready_server::models::{
    StoredIdentity, SubscriptionDefaults, SubscriptionRecord, UsageOutcome, UserRecord,
};
use callready_server::services::identity::{
    Argon2Settings, IdentityStore, MemoryIdentityCache, MemoryIdentityStore, PasswordHasher,
    Reconciler, SessionCodec, StoreError,
};

/// Signing key used by every test codec.
pub const TEST_SESSION_SECRET: &str = "k7#Qp2!vX9@mL4$wR8^tY1&zN6*bH3%c";

/// Store timeout used by test reconcilers.
pub const TEST_STORE_TIMEOUT: Duration = Duration::from_millis(200);

/// Memory store that counts calls and can be made to fail or stall.
#[derive(Debug, Default)]
pub struct InstrumentedStore {
    inner: MemoryIdentityStore,
    calls: AtomicUsize,
    down: AtomicBool,
    delay_ms: AtomicU64,
}

impl InstrumentedStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of trait calls so far, including failed ones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Make every call fail with `StoreError::Unavailable`.
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    /// Delay every call by `delay` before answering.
    pub fn set_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.delay_ms.store(millis, Ordering::SeqCst);
    }

    /// Insert a user behind the reconciler's back, as an out-of-band process would.
    /// Not counted as a call.
    pub async fn seed(&self, record: &UserRecord) {
        self.inner.insert_credential(record).await.unwrap();
        self.inner
            .ensure_subscription(record.id, &SubscriptionDefaults::default())
            .await
            .unwrap();
    }

    /// Read a user without counting a call.
    pub async fn peek(&self, email: &Email) -> Option<StoredIdentity> {
        self.inner.find_by_email(email).await.unwrap()
    }

    async fn enter(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if self.down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".to_owned()));
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for InstrumentedStore {
    async fn find_by_email(&self, email: &Email) -> Result<Option<StoredIdentity>, StoreError> {
        self.enter().await?;
        self.inner.find_by_email(email).await
    }

    async fn insert_credential(&self, record: &UserRecord) -> Result<(), StoreError> {
        self.enter().await?;
        self.inner.insert_credential(record).await
    }

    async fn upsert_credential(&self, record: &UserRecord) -> Result<(), StoreError> {
        self.enter().await?;
        self.inner.upsert_credential(record).await
    }

    async fn ensure_subscription(
        &self,
        user_id: UserId,
        defaults: &SubscriptionDefaults,
    ) -> Result<SubscriptionRecord, StoreError> {
        self.enter().await?;
        self.inner.ensure_subscription(user_id, defaults).await
    }

    async fn find_subscription(
        &self,
        user_id: UserId,
    ) -> Result<Option<SubscriptionRecord>, StoreError> {
        self.enter().await?;
        self.inner.find_subscription(user_id).await
    }

    async fn record_usage(&self, user_id: UserId) -> Result<UsageOutcome, StoreError> {
        self.enter().await?;
        self.inner.record_usage(user_id).await
    }

    async fn set_plan(
        &self,
        user_id: UserId,
        plan: PlanTier,
    ) -> Result<Option<SubscriptionRecord>, StoreError> {
        self.enter().await?;
        self.inner.set_plan(user_id, plan).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.enter().await
    }
}

/// A reconciler wired to an inspectable cache and store.
pub struct TestContext {
    pub reconciler: Reconciler,
    pub cache: Arc<MemoryIdentityCache>,
    pub store: Arc<InstrumentedStore>,
    pub hasher: PasswordHasher,
}

impl TestContext {
    #[must_use]
    pub fn new() -> Self {
        let cache = Arc::new(MemoryIdentityCache::new());
        let store = Arc::new(InstrumentedStore::new());
        let hasher = hasher();
        let reconciler = Reconciler::new(
            cache.clone(),
            store.clone(),
            hasher.clone(),
            codec(),
            TEST_STORE_TIMEOUT,
        );

        Self {
            reconciler,
            cache,
            store,
            hasher,
        }
    }

    /// A user record with a freshly hashed password.
    #[must_use]
    pub fn user(&self, address: &str, password: &str, display_name: &str) -> UserRecord {
        UserRecord {
            id: UserId::generate(),
            email: email(address),
            display_name: display_name.to_owned(),
            password_hash: self.hasher.hash(password).unwrap(),
        }
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse an email, panicking on invalid input.
#[must_use]
pub fn email(s: &str) -> Email {
    Email::parse(s).unwrap()
}

/// The cheapest Argon2 hasher.
#[must_use]
pub fn hasher() -> PasswordHasher {
    PasswordHasher::new(Argon2Settings::minimal()).unwrap()
}

/// A codec with the test key and a 7-day validity.
#[must_use]
pub fn codec() -> SessionCodec {
    SessionCodec::new(
        SecretString::from(TEST_SESSION_SECRET),
        chrono::Duration::days(7),
    )
}

/// Server configuration for router tests.
#[must_use]
pub fn test_config() -> ServerConfig {
    ServerConfig {
        database_url: None,
        host: "127.0.0.1".parse().unwrap(),
        port: 3000,
        base_url: "http://localhost:3000".to_owned(),
        session_secret: SecretString::from(TEST_SESSION_SECRET),
        session_ttl: chrono::Duration::days(7),
        store_timeout: TEST_STORE_TIMEOUT,
        argon2: Argon2Settings::minimal(),
        sentry: SentryConfig::default(),
    }
}
