//! User and subscription domain types.
//!
//! These types represent validated domain objects separate from database row types.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use callready_core::{Email, PlanTier, SubscriptionStatus, UserId};

/// Length of a billing period for usage accounting.
const BILLING_PERIOD_DAYS: i64 = 30;

/// A user credential record.
///
/// Same shape in the identity cache and the identity store.
#[derive(Clone, PartialEq, Eq)]
pub struct UserRecord {
    /// Stable ID, assigned once at creation.
    pub id: UserId,
    /// Natural key, unique across the system.
    pub email: Email,
    /// Human-readable name.
    pub display_name: String,
    /// Argon2id PHC string.
    pub password_hash: String,
}

impl std::fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserRecord")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("display_name", &self.display_name)
            .field("password_hash", &"[REDACTED]")
            .finish()
    }
}

/// A subscription record, 1:1 with a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionRecord {
    pub user_id: UserId,
    pub plan: PlanTier,
    pub status: SubscriptionStatus,
    /// Generations used in the current period.
    pub usage_count: i32,
    /// Generations allowed per period (`None` = unlimited).
    pub usage_limit: Option<i32>,
    /// When the current period ends.
    pub renews_at: DateTime<Utc>,
}

impl SubscriptionRecord {
    /// Meter one generation as of `now`.
    ///
    /// Rolls the billing period forward first if it has ended, which resets
    /// the usage counter. Nothing is counted for inactive subscriptions or
    /// once the limit is reached.
    pub fn meter(&mut self, now: DateTime<Utc>) -> UsageOutcome {
        if now >= self.renews_at {
            self.usage_count = 0;
            while self.renews_at <= now {
                self.renews_at += Duration::days(BILLING_PERIOD_DAYS);
            }
        }

        if self.status != SubscriptionStatus::Active {
            return UsageOutcome::Inactive;
        }

        if let Some(limit) = self.usage_limit
            && self.usage_count >= limit
        {
            return UsageOutcome::LimitReached { usage_limit: limit };
        }

        self.usage_count += 1;
        UsageOutcome::Recorded {
            usage_count: self.usage_count,
            usage_limit: self.usage_limit,
        }
    }

    /// Move the subscription to `plan`, reactivating it with the plan's limit.
    pub const fn apply_plan(&mut self, plan: PlanTier) {
        self.plan = plan;
        self.status = SubscriptionStatus::Active;
        self.usage_limit = plan.usage_limit();
    }
}

/// Values used when a subscription is created for a new account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionDefaults {
    pub plan: PlanTier,
    pub status: SubscriptionStatus,
    pub usage_limit: Option<i32>,
    pub period: Duration,
}

impl Default for SubscriptionDefaults {
    fn default() -> Self {
        Self::for_plan(PlanTier::Free)
    }
}

impl SubscriptionDefaults {
    /// Defaults for an active subscription on the given plan.
    #[must_use]
    pub fn for_plan(plan: PlanTier) -> Self {
        Self {
            plan,
            status: SubscriptionStatus::Active,
            usage_limit: plan.usage_limit(),
            period: Duration::days(BILLING_PERIOD_DAYS),
        }
    }

    /// Build the initial record for `user_id`, with the period starting at `now`.
    #[must_use]
    pub fn build(&self, user_id: UserId, now: DateTime<Utc>) -> SubscriptionRecord {
        SubscriptionRecord {
            user_id,
            plan: self.plan,
            status: self.status,
            usage_count: 0,
            usage_limit: self.usage_limit,
            renews_at: now + self.period,
        }
    }
}

/// A user record as held by the identity store, with its subscription.
#[derive(Debug, Clone)]
pub struct StoredIdentity {
    pub record: UserRecord,
    /// `None` only for rows created before subscriptions were ensured.
    pub subscription: Option<SubscriptionRecord>,
}

/// Result of metering one generation against a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageOutcome {
    /// Usage was incremented.
    Recorded {
        usage_count: i32,
        usage_limit: Option<i32>,
    },
    /// The period's limit was already reached; nothing was recorded.
    LimitReached { usage_limit: i32 },
    /// The subscription is canceled; nothing was recorded.
    Inactive,
    /// The user has no subscription row.
    NoSubscription,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn record() -> UserRecord {
        UserRecord {
            id: UserId::generate(),
            email: Email::parse("rep@acme.io").unwrap(),
            display_name: "Rep".to_owned(),
            password_hash: "$argon2id$v=19$secret-material".to_owned(),
        }
    }

    #[test]
    fn test_user_record_debug_redacts_hash() {
        let debug = format!("{:?}", record());
        assert!(debug.contains("rep@acme.io"));
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("secret-material"));
    }

    #[test]
    fn test_default_subscription_is_free_tier() {
        let now = Utc::now();
        let user_id = UserId::generate();
        let sub = SubscriptionDefaults::default().build(user_id, now);

        assert_eq!(sub.user_id, user_id);
        assert_eq!(sub.plan, PlanTier::Free);
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.usage_count, 0);
        assert_eq!(sub.usage_limit, Some(5));
        assert_eq!(sub.renews_at, now + Duration::days(30));
    }

    #[test]
    fn test_meter_counts_until_limit() {
        let now = Utc::now();
        let mut sub = SubscriptionDefaults::default().build(UserId::generate(), now);

        for expected in 1..=5 {
            assert_eq!(
                sub.meter(now),
                UsageOutcome::Recorded {
                    usage_count: expected,
                    usage_limit: Some(5)
                }
            );
        }
        assert_eq!(sub.meter(now), UsageOutcome::LimitReached { usage_limit: 5 });
        assert_eq!(sub.usage_count, 5);
    }

    #[test]
    fn test_meter_rolls_period() {
        let start = Utc::now();
        let mut sub = SubscriptionDefaults::default().build(UserId::generate(), start);
        sub.usage_count = 5;

        let later = start + Duration::days(31);
        assert_eq!(
            sub.meter(later),
            UsageOutcome::Recorded {
                usage_count: 1,
                usage_limit: Some(5)
            }
        );
        assert!(sub.renews_at > later);
    }

    #[test]
    fn test_meter_inactive_and_unlimited() {
        let now = Utc::now();
        let mut sub =
            SubscriptionDefaults::for_plan(PlanTier::Enterprise).build(UserId::generate(), now);
        sub.usage_count = 10_000;
        assert!(matches!(
            sub.meter(now),
            UsageOutcome::Recorded {
                usage_limit: None,
                ..
            }
        ));

        sub.status = SubscriptionStatus::Canceled;
        assert_eq!(sub.meter(now), UsageOutcome::Inactive);
    }

    #[test]
    fn test_apply_plan() {
        let mut sub = SubscriptionDefaults::default().build(UserId::generate(), Utc::now());
        sub.status = SubscriptionStatus::Canceled;

        sub.apply_plan(PlanTier::Pro);
        assert_eq!(sub.plan, PlanTier::Pro);
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.usage_limit, Some(500));
    }
}
