//! Identity reconciliation.
//!
//! # Components
//!
//! - [`IdentityCache`] - process-local credential lookup, consulted first
//! - [`IdentityStore`] - durable system of record (`PostgreSQL` or in-memory)
//! - [`Reconciler`] - decides between the two on login and registration
//! - [`SessionCodec`] - signed, client-held session tokens

mod cache;
mod error;
mod memory;
mod password;
mod postgres;
mod reconciler;
mod store;
mod token;

pub use cache::{CacheOrigin, CachedIdentity, IdentityCache, MemoryIdentityCache};
pub use error::{PasswordError, StoreError, TokenError};
pub use memory::MemoryIdentityStore;
pub use password::{Argon2Settings, PasswordHasher};
pub use postgres::PgIdentityStore;
pub use reconciler::{
    AuthOutcome, AuthenticatedUser, DEFAULT_STORE_TIMEOUT, MIN_PASSWORD_LENGTH, Reconciler,
    RegisterOutcome, SessionState,
};
pub use store::IdentityStore;
pub use token::{DEFAULT_SESSION_TTL_HOURS, SessionCodec, SessionToken};
