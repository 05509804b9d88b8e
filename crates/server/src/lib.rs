//! CallReady identity server library.
//!
//! This crate provides the identity core as a library, allowing it to be
//! tested and reused: the identity cache, the identity store adapters, the
//! reconciler between them, signed session tokens, and the JSON API that
//! exposes them.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
