//! # Chantiers Common Library
//!
//! Shared code for the chantiers service crates including:
//! - Database bootstrap and schema migrations
//! - Domain enums, status workflows and derived-field calculations
//! - Role/action permission table
//! - Bearer token hashing
//! - Configuration loading

pub mod api;
pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod domain;
pub mod error;
pub mod time;

pub use error::{Error, Result};
