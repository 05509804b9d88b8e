//! Business logic services.
//!
//! # Services
//!
//! - `identity` - Identity cache, identity store adapters, the reconciler
//!   that resolves logins across them, and the session token codec

pub mod identity;
