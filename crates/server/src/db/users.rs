//! User repository for database operations.
//!
//! Queries are checked at runtime against `app.user_account`; rows are
//! mapped through `FromRow` structs and validated into domain types here.

use sqlx::PgPool;

use callready_core::{Email, PlanTier, SubscriptionStatus, UserId};

use super::RepositoryError;
use crate::models::{StoredIdentity, SubscriptionRecord, UserRecord};

#[derive(sqlx::FromRow)]
struct UserRow {
    id: uuid::Uuid,
    email: String,
    display_name: String,
    password_hash: String,
    plan: Option<PlanTier>,
    status: Option<SubscriptionStatus>,
    usage_count: Option<i32>,
    usage_limit: Option<i32>,
    renews_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl UserRow {
    fn into_identity(self) -> Result<StoredIdentity, RepositoryError> {
        let email = Email::parse(&self.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;
        let id = UserId::new(self.id);

        // The LEFT JOIN yields all-NULL subscription columns for users that
        // predate subscriptions.
        let subscription = match (self.plan, self.status, self.usage_count, self.renews_at) {
            (Some(plan), Some(status), Some(usage_count), Some(renews_at)) => {
                Some(SubscriptionRecord {
                    user_id: id,
                    plan,
                    status,
                    usage_count,
                    usage_limit: self.usage_limit,
                    renews_at,
                })
            }
            _ => None,
        };

        Ok(StoredIdentity {
            record: UserRecord {
                id,
                email,
                display_name: self.display_name,
                password_hash: self.password_hash,
            },
            subscription,
        })
    }
}

/// Repository for user database operations.
pub struct UserRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> UserRepository<'a> {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a user, with their subscription, by email address.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the email in the database is invalid.
    pub async fn get_by_email(
        &self,
        email: &Email,
    ) -> Result<Option<StoredIdentity>, RepositoryError> {
        let row: Option<UserRow> = sqlx::query_as(
            r"
            SELECT u.id, u.email, u.display_name, u.password_hash,
                   s.plan, s.status, s.usage_count, s.usage_limit, s.renews_at
            FROM app.user_account u
            LEFT JOIN app.subscription s ON s.user_id = u.id
            WHERE u.email = $1
            ",
        )
        .bind(email.as_str())
        .fetch_optional(self.pool)
        .await?;

        row.map(UserRow::into_identity).transpose()
    }

    /// Insert a new user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the email or ID already exists.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn create(&self, record: &UserRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO app.user_account (id, email, display_name, password_hash)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(record.id)
        .bind(record.email.as_str())
        .bind(&record.display_name)
        .bind(&record.password_hash)
        .execute(self.pool)
        .await
        .map_err(|e| RepositoryError::from_write(e, "user"))?;

        Ok(())
    }

    /// Insert a user, or update the display name and password hash of the
    /// existing user with the same email. The existing ID is kept.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the ID belongs to another email.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn upsert(&self, record: &UserRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO app.user_account (id, email, display_name, password_hash)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (email) DO UPDATE
            SET display_name = EXCLUDED.display_name,
                password_hash = EXCLUDED.password_hash,
                updated_at = NOW()
            ",
        )
        .bind(record.id)
        .bind(record.email.as_str())
        .bind(&record.display_name)
        .bind(&record.password_hash)
        .execute(self.pool)
        .await
        .map_err(|e| RepositoryError::from_write(e, "user id"))?;

        Ok(())
    }
}
