//! Common utilities and types shared across the customer platform crates.

#![warn(clippy::pedantic)]

/// Module for common data types
pub mod types;

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for the UTC session time-zone qualifier on database connections
pub mod time_zone;
