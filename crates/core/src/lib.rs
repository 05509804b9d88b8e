//! CallReady Core - Shared types library.
//!
//! This crate provides common types used across all CallReady components:
//! - `server` - Identity reconciliation and the JSON API
//! - `cli` - Command-line tools for migrations and account management
//!
//! # Architecture
//!
//! The core crate contains only types and traits - no I/O, no database access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, emails, and plan tiers

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
