//! API module for shared HTTP API functionality
//!
//! # Design Principle
//!
//! This module contains ONLY:
//! - Pure functions (no HTTP framework dependencies)
//! - Database operations (via sqlx)
//!
//! The service crate wraps these with axum middleware.

pub mod auth;

pub use auth::{generate_token, hash_token, parse_bearer, ApiAuthError};
#[cfg(feature = "sqlx")]
pub use auth::{issue_token, lookup_token, Identity};
