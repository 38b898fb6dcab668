//! Common library for the Brewline services
//!
//! Shared infrastructure used by the auth, api and worker binaries:
//! database connectivity and migrations, the cache store, JWT handling,
//! outbound email, error types, input validation rules and low-stock alerts.

pub mod alerts;
pub mod cache;
pub mod database;
pub mod error;
pub mod jwt;
pub mod mailer;
pub mod validation;
