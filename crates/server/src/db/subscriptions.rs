//! Subscription repository for database operations.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use callready_core::{PlanTier, SubscriptionStatus, UserId};

use super::RepositoryError;
use crate::models::{SubscriptionDefaults, SubscriptionRecord, UsageOutcome};

#[derive(sqlx::FromRow)]
struct SubscriptionRow {
    user_id: uuid::Uuid,
    plan: PlanTier,
    status: SubscriptionStatus,
    usage_count: i32,
    usage_limit: Option<i32>,
    renews_at: DateTime<Utc>,
}

impl From<SubscriptionRow> for SubscriptionRecord {
    fn from(row: SubscriptionRow) -> Self {
        Self {
            user_id: UserId::new(row.user_id),
            plan: row.plan,
            status: row.status,
            usage_count: row.usage_count,
            usage_limit: row.usage_limit,
            renews_at: row.renews_at,
        }
    }
}

/// Repository for subscription database operations.
pub struct SubscriptionRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> SubscriptionRepository<'a> {
    /// Create a new subscription repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get the subscription for a user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, user_id: UserId) -> Result<Option<SubscriptionRecord>, RepositoryError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(
            r"
            SELECT user_id, plan, status, usage_count, usage_limit, renews_at
            FROM app.subscription
            WHERE user_id = $1
            ",
        )
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// Create the subscription if the user has none, then return the current row.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails, including when
    /// the user does not exist.
    pub async fn ensure(
        &self,
        user_id: UserId,
        defaults: &SubscriptionDefaults,
    ) -> Result<SubscriptionRecord, RepositoryError> {
        let initial = defaults.build(user_id, Utc::now());

        sqlx::query(
            r"
            INSERT INTO app.subscription (user_id, plan, status, usage_count, usage_limit, renews_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id) DO NOTHING
            ",
        )
        .bind(initial.user_id)
        .bind(initial.plan)
        .bind(initial.status)
        .bind(initial.usage_count)
        .bind(initial.usage_limit)
        .bind(initial.renews_at)
        .execute(self.pool)
        .await?;

        self.get(user_id).await?.ok_or_else(|| {
            RepositoryError::DataCorruption(format!("subscription for {user_id} vanished"))
        })
    }

    /// Meter one generation under a row lock.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn record_usage(&self, user_id: UserId) -> Result<UsageOutcome, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row: Option<SubscriptionRow> = sqlx::query_as(
            r"
            SELECT user_id, plan, status, usage_count, usage_limit, renews_at
            FROM app.subscription
            WHERE user_id = $1
            FOR UPDATE
            ",
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(UsageOutcome::NoSubscription);
        };

        let mut subscription = SubscriptionRecord::from(row);
        let outcome = subscription.meter(Utc::now());

        sqlx::query(
            r"
            UPDATE app.subscription
            SET usage_count = $2, renews_at = $3, updated_at = NOW()
            WHERE user_id = $1
            ",
        )
        .bind(user_id)
        .bind(subscription.usage_count)
        .bind(subscription.renews_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(outcome)
    }

    /// Change the plan, reactivating the subscription with the plan's limit.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn set_plan(
        &self,
        user_id: UserId,
        plan: PlanTier,
    ) -> Result<Option<SubscriptionRecord>, RepositoryError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(
            r"
            UPDATE app.subscription
            SET plan = $2, status = $3, usage_limit = $4, updated_at = NOW()
            WHERE user_id = $1
            RETURNING user_id, plan, status, usage_count, usage_limit, renews_at
            ",
        )
        .bind(user_id)
        .bind(plan)
        .bind(SubscriptionStatus::Active)
        .bind(plan.usage_limit())
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Into::into))
    }
}
