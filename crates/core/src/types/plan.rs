//! Subscription plan tiers and status.

use serde::{Deserialize, Serialize};

/// Subscription plan tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "app.plan_tier", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    /// Default tier for every new account.
    #[default]
    Free,
    Starter,
    Pro,
    Enterprise,
}

impl PlanTier {
    /// Number of generations included per billing period.
    ///
    /// `None` means unlimited.
    #[must_use]
    pub const fn usage_limit(self) -> Option<i32> {
        match self {
            Self::Free => Some(5),
            Self::Starter => Some(50),
            Self::Pro => Some(500),
            Self::Enterprise => None,
        }
    }
}

impl std::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Free => write!(f, "free"),
            Self::Starter => write!(f, "starter"),
            Self::Pro => write!(f, "pro"),
            Self::Enterprise => write!(f, "enterprise"),
        }
    }
}

impl std::str::FromStr for PlanTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(Self::Free),
            "starter" => Ok(Self::Starter),
            "pro" => Ok(Self::Pro),
            "enterprise" => Ok(Self::Enterprise),
            _ => Err(format!("invalid plan tier: {s}")),
        }
    }
}

/// Subscription lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "app.subscription_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    #[default]
    Active,
    Canceled,
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Canceled => write!(f, "canceled"),
        }
    }
}
