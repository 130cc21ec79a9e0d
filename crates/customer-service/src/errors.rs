//! Customer Service error types.

use crate::config::ConfigError;
use crate::wiring::Capability;
use thiserror::Error;

/// Customer Service error type.
#[derive(Debug, Error)]
pub enum CustomerError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Schema validation failed: {0}")]
    SchemaValidation(String),

    /// Boot found neither a substitute nor a production binding.
    #[error("No binding available for {0}")]
    UnresolvedDependency(Capability),

    #[error("Object storage error: {0}")]
    Storage(String),

    #[error("Cryptographic error: {0}")]
    Crypto(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

impl From<sqlx::Error> for CustomerError {
    fn from(err: sqlx::Error) -> Self {
        CustomerError::Database(err.to_string())
    }
}

impl From<ConfigError> for CustomerError {
    fn from(err: ConfigError) -> Self {
        CustomerError::Configuration(err.to_string())
    }
}
