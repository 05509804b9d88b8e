//! Identity store adapter trait.

use async_trait::async_trait;

use callready_core::{Email, PlanTier, UserId};

use super::error::StoreError;
use crate::models::{
    StoredIdentity, SubscriptionDefaults, SubscriptionRecord, UsageOutcome, UserRecord,
};

/// Durable system of record for users and their subscriptions.
///
/// Every method may fail with [`StoreError::Unavailable`], which callers must
/// keep distinct from "not found". The backend enforces email uniqueness;
/// the application does not lock around it.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Look up a user, with their subscription, by email.
    async fn find_by_email(&self, email: &Email) -> Result<Option<StoredIdentity>, StoreError>;

    /// Create a user.
    ///
    /// Fails with [`StoreError::Conflict`] if the email or ID already exists.
    async fn insert_credential(&self, record: &UserRecord) -> Result<(), StoreError>;

    /// Create a user, or update the hash and display name of the existing
    /// user with the same email. An existing ID is never reassigned.
    async fn upsert_credential(&self, record: &UserRecord) -> Result<(), StoreError>;

    /// Create the default subscription for `user_id` if it has none.
    ///
    /// Idempotent: returns the existing subscription unchanged.
    async fn ensure_subscription(
        &self,
        user_id: UserId,
        defaults: &SubscriptionDefaults,
    ) -> Result<SubscriptionRecord, StoreError>;

    /// Look up the subscription for `user_id`.
    async fn find_subscription(
        &self,
        user_id: UserId,
    ) -> Result<Option<SubscriptionRecord>, StoreError>;

    /// Meter one generation against the user's subscription.
    async fn record_usage(&self, user_id: UserId) -> Result<UsageOutcome, StoreError>;

    /// Administrative plan override. Resets the usage limit to the plan's.
    ///
    /// Returns `None` if the user has no subscription.
    async fn set_plan(
        &self,
        user_id: UserId,
        plan: PlanTier,
    ) -> Result<Option<SubscriptionRecord>, StoreError>;

    /// Cheap reachability check.
    async fn ping(&self) -> Result<(), StoreError>;
}
