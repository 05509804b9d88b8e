//! In-process identity store.
//!
//! Used when no database is configured and as the backing store for tests.
//! Unique email and ID constraints are enforced under one lock, mirroring the
//! database's unique indexes.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use callready_core::{Email, PlanTier, UserId};

use super::error::StoreError;
use super::store::IdentityStore;
use crate::models::{
    StoredIdentity, SubscriptionDefaults, SubscriptionRecord, UsageOutcome, UserRecord,
};

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<Email, UserRecord>,
    subscriptions: HashMap<UserId, SubscriptionRecord>,
}

impl Tables {
    fn id_taken(&self, id: UserId) -> bool {
        self.users.values().any(|user| user.id == id)
    }
}

/// Identity store held in process memory. Lost on restart.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    tables: Mutex<Tables>,
}

impl MemoryIdentityStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored users.
    pub async fn user_count(&self) -> usize {
        self.tables.lock().await.users.len()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn find_by_email(&self, email: &Email) -> Result<Option<StoredIdentity>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.users.get(email).map(|record| StoredIdentity {
            record: record.clone(),
            subscription: tables.subscriptions.get(&record.id).cloned(),
        }))
    }

    async fn insert_credential(&self, record: &UserRecord) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.users.contains_key(&record.email) || tables.id_taken(record.id) {
            return Err(StoreError::Conflict);
        }
        tables.users.insert(record.email.clone(), record.clone());
        Ok(())
    }

    async fn upsert_credential(&self, record: &UserRecord) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        if let Some(existing) = tables.users.get_mut(&record.email) {
            existing.display_name.clone_from(&record.display_name);
            existing.password_hash.clone_from(&record.password_hash);
            return Ok(());
        }
        if tables.id_taken(record.id) {
            return Err(StoreError::Conflict);
        }
        tables.users.insert(record.email.clone(), record.clone());
        Ok(())
    }

    async fn ensure_subscription(
        &self,
        user_id: UserId,
        defaults: &SubscriptionDefaults,
    ) -> Result<SubscriptionRecord, StoreError> {
        let mut tables = self.tables.lock().await;
        if !tables.id_taken(user_id) {
            return Err(StoreError::Corrupt(format!(
                "subscription for unknown user {user_id}"
            )));
        }
        Ok(tables
            .subscriptions
            .entry(user_id)
            .or_insert_with(|| defaults.build(user_id, Utc::now()))
            .clone())
    }

    async fn find_subscription(
        &self,
        user_id: UserId,
    ) -> Result<Option<SubscriptionRecord>, StoreError> {
        Ok(self.tables.lock().await.subscriptions.get(&user_id).cloned())
    }

    async fn record_usage(&self, user_id: UserId) -> Result<UsageOutcome, StoreError> {
        let mut tables = self.tables.lock().await;
        Ok(tables
            .subscriptions
            .get_mut(&user_id)
            .map_or(UsageOutcome::NoSubscription, |sub| sub.meter(Utc::now())))
    }

    async fn set_plan(
        &self,
        user_id: UserId,
        plan: PlanTier,
    ) -> Result<Option<SubscriptionRecord>, StoreError> {
        let mut tables = self.tables.lock().await;
        Ok(tables.subscriptions.get_mut(&user_id).map(|sub| {
            sub.apply_plan(plan);
            sub.clone()
        }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn record(email: &str, name: &str) -> UserRecord {
        UserRecord {
            id: UserId::generate(),
            email: Email::parse(email).unwrap(),
            display_name: name.to_owned(),
            password_hash: "hash".to_owned(),
        }
    }

    #[tokio::test]
    async fn test_insert_then_find() {
        let store = MemoryIdentityStore::new();
        let user = record("a@x.com", "Avery");
        store.insert_credential(&user).await.unwrap();

        let found = store.find_by_email(&user.email).await.unwrap().unwrap();
        assert_eq!(found.record, user);
        assert!(found.subscription.is_none());
        assert_eq!(store.user_count().await, 1);
    }

    #[tokio::test]
    async fn test_insert_duplicate_email_conflicts() {
        let store = MemoryIdentityStore::new();
        store
            .insert_credential(&record("a@x.com", "First"))
            .await
            .unwrap();

        let result = store.insert_credential(&record("a@x.com", "Second")).await;
        assert!(matches!(result, Err(StoreError::Conflict)));
    }

    #[tokio::test]
    async fn test_insert_duplicate_id_conflicts() {
        let store = MemoryIdentityStore::new();
        let first = record("a@x.com", "First");
        store.insert_credential(&first).await.unwrap();

        let mut second = record("b@x.com", "Second");
        second.id = first.id;
        let result = store.insert_credential(&second).await;
        assert!(matches!(result, Err(StoreError::Conflict)));
    }

    #[tokio::test]
    async fn test_upsert_keeps_existing_id() {
        let store = MemoryIdentityStore::new();
        let original = record("a@x.com", "Old");
        store.insert_credential(&original).await.unwrap();

        let mut update = record("a@x.com", "New");
        update.password_hash = "hash2".to_owned();
        store.upsert_credential(&update).await.unwrap();

        let found = store
            .find_by_email(&original.email)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.record.id, original.id);
        assert_eq!(found.record.display_name, "New");
        assert_eq!(found.record.password_hash, "hash2");
    }

    #[tokio::test]
    async fn test_ensure_subscription_is_idempotent() {
        let store = MemoryIdentityStore::new();
        let user = record("a@x.com", "Avery");
        store.insert_credential(&user).await.unwrap();

        let first = store
            .ensure_subscription(user.id, &SubscriptionDefaults::default())
            .await
            .unwrap();
        store.record_usage(user.id).await.unwrap();
        let second = store
            .ensure_subscription(user.id, &SubscriptionDefaults::default())
            .await
            .unwrap();

        assert_eq!(first.plan, PlanTier::Free);
        assert_eq!(second.usage_count, 1);
        assert_eq!(second.renews_at, first.renews_at);
    }

    #[tokio::test]
    async fn test_ensure_subscription_requires_user() {
        let store = MemoryIdentityStore::new();
        let result = store
            .ensure_subscription(UserId::generate(), &SubscriptionDefaults::default())
            .await;
        assert!(matches!(result, Err(StoreError::Corrupt(_))));
    }

    #[tokio::test]
    async fn test_record_usage_and_set_plan() {
        let store = MemoryIdentityStore::new();
        let user = record("a@x.com", "Avery");
        store.insert_credential(&user).await.unwrap();
        assert_eq!(
            store.record_usage(user.id).await.unwrap(),
            UsageOutcome::NoSubscription
        );

        store
            .ensure_subscription(user.id, &SubscriptionDefaults::default())
            .await
            .unwrap();
        for _ in 0..5 {
            store.record_usage(user.id).await.unwrap();
        }
        assert_eq!(
            store.record_usage(user.id).await.unwrap(),
            UsageOutcome::LimitReached { usage_limit: 5 }
        );

        let upgraded = store
            .set_plan(user.id, PlanTier::Starter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(upgraded.usage_limit, Some(50));
        assert!(matches!(
            store.record_usage(user.id).await.unwrap(),
            UsageOutcome::Recorded { usage_count: 6, .. }
        ));
    }

    #[tokio::test]
    async fn test_set_plan_without_subscription() {
        let store = MemoryIdentityStore::new();
        let result = store
            .set_plan(UserId::generate(), PlanTier::Pro)
            .await
            .unwrap();
        assert!(result.is_none());
    }
}
