//! Process-local identity cache.
//!
//! The cache is the primary lookup for credential validation. It is not a
//! system of record: entries live until the process exits, a lost update
//! costs one extra store round trip, and the store always wins when both
//! are consulted in the same call.

use dashmap::DashMap;

use callready_core::{Email, UserId};

use super::error::PasswordError;
use super::password::PasswordHasher;
use crate::models::UserRecord;

/// Where a cache entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOrigin {
    /// Read from (or written to) the identity store.
    Store,
    /// Registered while the store was unreachable; exists only in this process.
    Local,
}

/// A cached credential record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedIdentity {
    pub record: UserRecord,
    pub origin: CacheOrigin,
}

impl CachedIdentity {
    /// Whether the store is known to hold this record.
    #[must_use]
    pub fn is_store_confirmed(&self) -> bool {
        self.origin == CacheOrigin::Store
    }
}

/// Fast, synchronous lookup of credential records keyed by email.
///
/// Implementations must be safe to share across request handlers. None of
/// the operations may block on I/O.
pub trait IdentityCache: Send + Sync {
    /// Insert or overwrite the entry for `record.email`.
    fn insert(&self, record: UserRecord, origin: CacheOrigin);

    /// Look up the entry for `email`.
    fn get(&self, email: &Email) -> Option<CachedIdentity>;

    /// Number of cached entries.
    fn len(&self) -> usize;

    /// Whether the cache is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cache a record that the store holds.
    fn put(&self, email: &Email, id: UserId, password_hash: &str, display_name: &str) {
        self.insert(
            UserRecord {
                id,
                email: email.clone(),
                display_name: display_name.to_owned(),
                password_hash: password_hash.to_owned(),
            },
            CacheOrigin::Store,
        );
    }

    /// Cache a record the store has not accepted yet.
    fn put_local(&self, email: &Email, id: UserId, password_hash: &str, display_name: &str) {
        self.insert(
            UserRecord {
                id,
                email: email.clone(),
                display_name: display_name.to_owned(),
                password_hash: password_hash.to_owned(),
            },
            CacheOrigin::Local,
        );
    }

    /// Check `password` against the cached hash for `email`.
    ///
    /// Returns `Ok(None)` for both an unknown email and a wrong password so
    /// callers cannot tell which emails are registered.
    ///
    /// # Errors
    ///
    /// Returns `PasswordError::CorruptHash` if the cached hash is unreadable.
    fn validate(
        &self,
        email: &Email,
        password: &str,
        hasher: &PasswordHasher,
    ) -> Result<Option<CachedIdentity>, PasswordError> {
        let Some(entry) = self.get(email) else {
            return Ok(None);
        };

        if hasher.verify(password, &entry.record.password_hash)? {
            Ok(Some(entry))
        } else {
            Ok(None)
        }
    }
}

/// Unbounded in-memory cache. No eviction.
#[derive(Debug, Default)]
pub struct MemoryIdentityCache {
    entries: DashMap<Email, CachedIdentity>,
}

impl MemoryIdentityCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdentityCache for MemoryIdentityCache {
    fn insert(&self, record: UserRecord, origin: CacheOrigin) {
        self.entries
            .insert(record.email.clone(), CachedIdentity { record, origin });
    }

    fn get(&self, email: &Email) -> Option<CachedIdentity> {
        self.entries.get(email).map(|entry| entry.value().clone())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
