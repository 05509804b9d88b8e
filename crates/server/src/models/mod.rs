//! Domain models for the identity core.

pub mod session;
pub mod user;

pub use session::SessionClaims;
pub use user::{
    StoredIdentity, SubscriptionDefaults, SubscriptionRecord, UsageOutcome, UserRecord,
};
