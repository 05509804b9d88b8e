//! `PostgreSQL` identity store.

use async_trait::async_trait;
use sqlx::PgPool;

use callready_core::{Email, PlanTier, UserId};

use super::error::StoreError;
use super::store::IdentityStore;
use crate::db::{RepositoryError, SubscriptionRepository, UserRepository};
use crate::models::{
    StoredIdentity, SubscriptionDefaults, SubscriptionRecord, UsageOutcome, UserRecord,
};

impl From<RepositoryError> for StoreError {
    fn from(e: RepositoryError) -> Self {
        match e {
            // Connection failures, pool timeouts and query errors all leave
            // the caller without an answer from the system of record.
            RepositoryError::Database(e) => Self::Unavailable(e.to_string()),
            RepositoryError::DataCorruption(msg) => Self::Corrupt(msg),
            RepositoryError::Conflict(_) => Self::Conflict,
        }
    }
}

/// Identity store backed by the `app` schema.
#[derive(Debug, Clone)]
pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn find_by_email(&self, email: &Email) -> Result<Option<StoredIdentity>, StoreError> {
        Ok(UserRepository::new(&self.pool).get_by_email(email).await?)
    }

    async fn insert_credential(&self, record: &UserRecord) -> Result<(), StoreError> {
        Ok(UserRepository::new(&self.pool).create(record).await?)
    }

    async fn upsert_credential(&self, record: &UserRecord) -> Result<(), StoreError> {
        Ok(UserRepository::new(&self.pool).upsert(record).await?)
    }

    async fn ensure_subscription(
        &self,
        user_id: UserId,
        defaults: &SubscriptionDefaults,
    ) -> Result<SubscriptionRecord, StoreError> {
        Ok(SubscriptionRepository::new(&self.pool)
            .ensure(user_id, defaults)
            .await?)
    }

    async fn find_subscription(
        &self,
        user_id: UserId,
    ) -> Result<Option<SubscriptionRecord>, StoreError> {
        Ok(SubscriptionRepository::new(&self.pool).get(user_id).await?)
    }

    async fn record_usage(&self, user_id: UserId) -> Result<UsageOutcome, StoreError> {
        Ok(SubscriptionRepository::new(&self.pool)
            .record_usage(user_id)
            .await?)
    }

    async fn set_plan(
        &self,
        user_id: UserId,
        plan: PlanTier,
    ) -> Result<Option<SubscriptionRecord>, StoreError> {
        Ok(SubscriptionRepository::new(&self.pool)
            .set_plan(user_id, plan)
            .await?)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(())
    }
}
