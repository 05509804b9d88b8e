//! Identity reconciliation between the process-local cache and the store.
//!
//! The cache answers first. The store is consulted on a cache miss and to
//! converge process-local registrations made while it was unreachable. Once
//! a call reaches the store, the store's record wins and overwrites the
//! cache entry.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::instrument;

use callready_core::{Email, UserId};

use super::cache::{CacheOrigin, CachedIdentity, IdentityCache};
use super::error::{PasswordError, StoreError};
use super::password::PasswordHasher;
use super::store::IdentityStore;
use super::token::{SessionCodec, SessionToken};
use crate::models::{
    SessionClaims, SubscriptionDefaults, SubscriptionRecord, UsageOutcome, UserRecord,
};

/// Minimum password length accepted at registration.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Default bound on a single store call.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(3);

/// A successfully authenticated user and the token issued for them.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
    pub email: Email,
    pub display_name: String,
    pub token: SessionToken,
}

/// Result of a login attempt.
#[derive(Debug, Clone)]
pub enum AuthOutcome {
    Authenticated(AuthenticatedUser),
    /// Unknown email or wrong password. The two are not distinguished.
    InvalidCredentials,
    /// The store could not be consulted and the cache had no answer.
    ServiceDegraded,
}

/// Result of a registration attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// The account exists, with the display name actually recorded.
    Created {
        user_id: UserId,
        display_name: String,
    },
    AlreadyExists,
    /// The password does not meet the policy; carries a user-facing reason.
    WeakPassword(String),
}

/// Authorization state derived from a session token.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Authenticated(SessionClaims),
    Anonymous,
}

/// Decides who a caller is, given the cache, the store and a password or token.
pub struct Reconciler {
    cache: Arc<dyn IdentityCache>,
    store: Arc<dyn IdentityStore>,
    hasher: PasswordHasher,
    codec: SessionCodec,
    store_timeout: Duration,
    defaults: SubscriptionDefaults,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("cached_identities", &self.cache.len())
            .field("codec", &self.codec)
            .field("store_timeout", &self.store_timeout)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Create a reconciler. New accounts get [`SubscriptionDefaults::default`].
    #[must_use]
    pub fn new(
        cache: Arc<dyn IdentityCache>,
        store: Arc<dyn IdentityStore>,
        hasher: PasswordHasher,
        codec: SessionCodec,
        store_timeout: Duration,
    ) -> Self {
        Self {
            cache,
            store,
            hasher,
            codec,
            store_timeout,
            defaults: SubscriptionDefaults::default(),
        }
    }

    /// Check a password and issue a session token on success.
    ///
    /// A matching entry already confirmed by the store answers without a
    /// store call, even if the store has since been changed out of band.
    /// The store is consulted, and its ID kept over the cached one, only on
    /// a cache miss or for a process-local entry made during an outage.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn authenticate(&self, email: &Email, password: &str) -> AuthOutcome {
        let matched = match self.cache.validate(email, password, &self.hasher) {
            Ok(matched) => matched,
            Err(e) => {
                tracing::error!(error = %e, "Corrupt password hash in identity cache");
                return AuthOutcome::ServiceDegraded;
            }
        };

        match matched {
            Some(entry) if entry.is_store_confirmed() => {
                tracing::debug!(user_id = %entry.record.id, "Authenticated from identity cache");
                return self.issue(&entry.record);
            }
            Some(entry) => return self.converge_local(entry, password).await,
            None => {}
        }

        if self.cache.get(email).is_some() {
            tracing::debug!("Password mismatch against identity cache");
            return AuthOutcome::InvalidCredentials;
        }

        tracing::debug!("Identity cache miss");
        match self.bounded(self.store.find_by_email(email)).await {
            Err(e) => {
                tracing::error!(error = %e, "Identity store unavailable during login");
                AuthOutcome::ServiceDegraded
            }
            Ok(None) => AuthOutcome::InvalidCredentials,
            Ok(Some(stored)) => {
                let outcome = match self.check_password(password, &stored.record) {
                    Some(true) => {
                        self.cache.insert(stored.record.clone(), CacheOrigin::Store);
                        self.issue(&stored.record)
                    }
                    Some(false) => AuthOutcome::InvalidCredentials,
                    None => AuthOutcome::ServiceDegraded,
                };

                if stored.subscription.is_none() && matches!(outcome, AuthOutcome::Authenticated(_)) {
                    self.ensure_subscription(stored.record.id).await;
                }
                outcome
            }
        }
    }

    /// Create an account.
    ///
    /// When the store is unreachable the account is kept in this process
    /// only and written through on the user's next login.
    ///
    /// # Errors
    ///
    /// Returns `PasswordError` if the password cannot be hashed.
    #[instrument(skip(self, password, display_name), fields(email = %email))]
    pub async fn register(
        &self,
        email: &Email,
        password: &str,
        display_name: &str,
    ) -> Result<RegisterOutcome, PasswordError> {
        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Ok(RegisterOutcome::WeakPassword(format!(
                "Password must be at least {MIN_PASSWORD_LENGTH} characters"
            )));
        }

        if self.cache.get(email).is_some() {
            return Ok(RegisterOutcome::AlreadyExists);
        }

        let display_name = match display_name.trim() {
            "" => email.local_part(),
            name => name,
        };
        let record = UserRecord {
            id: UserId::generate(),
            email: email.clone(),
            display_name: display_name.to_owned(),
            password_hash: self.hasher.hash(password)?,
        };

        match self.bounded(self.store.insert_credential(&record)).await {
            Ok(()) => {
                self.ensure_subscription(record.id).await;
                let (user_id, display_name) = (record.id, record.display_name.clone());
                self.cache.insert(record, CacheOrigin::Store);
                tracing::info!(user_id = %user_id, "Account created");
                Ok(RegisterOutcome::Created {
                    user_id,
                    display_name,
                })
            }
            Err(StoreError::Conflict) => Ok(RegisterOutcome::AlreadyExists),
            Err(e) => {
                let (user_id, display_name) = (record.id, record.display_name.clone());
                tracing::warn!(
                    user_id = %user_id,
                    error = %e,
                    "Identity store unavailable; account held in process only"
                );
                self.cache.insert(record, CacheOrigin::Local);
                Ok(RegisterOutcome::Created {
                    user_id,
                    display_name,
                })
            }
        }
    }

    /// Resolve a session token to an authorization state. Never touches the store.
    pub fn validate_token(&self, token: &str) -> SessionState {
        match self.codec.decode(token) {
            Ok(claims) => SessionState::Authenticated(claims),
            Err(e) => {
                tracing::debug!(reason = %e, "Rejected session token");
                SessionState::Anonymous
            }
        }
    }

    /// Issue a token for an identity established elsewhere (e.g. registration).
    #[must_use]
    pub fn issue_token(&self, user_id: UserId, email: &Email, display_name: &str) -> SessionToken {
        self.codec.encode(user_id, email, display_name)
    }

    /// The user's subscription, if the store can be reached.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the store is unavailable or times out.
    pub async fn subscription(
        &self,
        user_id: UserId,
    ) -> Result<Option<SubscriptionRecord>, StoreError> {
        self.bounded(self.store.find_subscription(user_id)).await
    }

    /// Meter one generation for the user.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the store is unavailable or times out.
    pub async fn record_usage(&self, user_id: UserId) -> Result<UsageOutcome, StoreError> {
        self.bounded(self.store.record_usage(user_id)).await
    }

    /// Whether the store answers within the timeout.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unavailable` otherwise.
    pub async fn ping_store(&self) -> Result<(), StoreError> {
        self.bounded(self.store.ping()).await
    }

    /// Converge a process-local entry whose password matched.
    async fn converge_local(&self, local: CachedIdentity, password: &str) -> AuthOutcome {
        let email = &local.record.email;

        let stored = match self.bounded(self.store.find_by_email(email)).await {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!(
                    user_id = %local.record.id,
                    error = %e,
                    "Identity store unavailable; serving process-local identity"
                );
                return self.issue(&local.record);
            }
        };

        if let Some(stored) = stored {
            return self.adopt_store_record(&local, stored.record, password);
        }

        match self.bounded(self.store.insert_credential(&local.record)).await {
            Ok(()) => {
                tracing::info!(user_id = %local.record.id, "Process-local account written to store");
                self.ensure_subscription(local.record.id).await;
                self.cache.insert(local.record.clone(), CacheOrigin::Store);
                self.issue(&local.record)
            }
            Err(StoreError::Conflict) => {
                // Someone else created the row between our lookup and insert.
                match self.bounded(self.store.find_by_email(email)).await {
                    Ok(Some(stored)) => self.adopt_store_record(&local, stored.record, password),
                    _ => self.issue(&local.record),
                }
            }
            Err(e) => {
                tracing::warn!(
                    user_id = %local.record.id,
                    error = %e,
                    "Could not write process-local account to store"
                );
                self.issue(&local.record)
            }
        }
    }

    /// Replace a cache entry with the store's record and check the password against it.
    fn adopt_store_record(
        &self,
        local: &CachedIdentity,
        record: UserRecord,
        password: &str,
    ) -> AuthOutcome {
        if record.id != local.record.id {
            tracing::warn!(
                cached_id = %local.record.id,
                store_id = %record.id,
                "Identity cache disagreed with store; store id kept"
            );
        }

        self.cache.insert(record.clone(), CacheOrigin::Store);

        match self.check_password(password, &record) {
            Some(true) => self.issue(&record),
            Some(false) => AuthOutcome::InvalidCredentials,
            None => AuthOutcome::ServiceDegraded,
        }
    }

    /// `None` if the stored hash is unreadable.
    fn check_password(&self, password: &str, record: &UserRecord) -> Option<bool> {
        match self.hasher.verify(password, &record.password_hash) {
            Ok(matches) => Some(matches),
            Err(e) => {
                tracing::error!(user_id = %record.id, error = %e, "Corrupt password hash in identity store");
                None
            }
        }
    }

    async fn ensure_subscription(&self, user_id: UserId) {
        if let Err(e) = self
            .bounded(self.store.ensure_subscription(user_id, &self.defaults))
            .await
        {
            tracing::warn!(user_id = %user_id, error = %e, "Could not ensure default subscription");
        }
    }

    fn issue(&self, record: &UserRecord) -> AuthOutcome {
        AuthOutcome::Authenticated(AuthenticatedUser {
            user_id: record.id,
            email: record.email.clone(),
            display_name: record.display_name.clone(),
            token: self
                .codec
                .encode(record.id, &record.email, &record.display_name),
        })
    }

    /// Run a store call under the configured timeout.
    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        tokio::time::timeout(self.store_timeout, call)
            .await
            .unwrap_or_else(|_| {
                Err(StoreError::Unavailable(format!(
                    "no answer within {}ms",
                    self.store_timeout.as_millis()
                )))
            })
    }
}
