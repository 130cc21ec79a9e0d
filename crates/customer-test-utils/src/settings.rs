//! Harness settings.
//!
//! Database name and credentials are fixed. The base image tag, readiness
//! timeout and migration-failure policy can be overridden from the
//! environment, e.g. to pin a different PostgreSQL major version in CI.

use crate::error::HarnessError;
use secrecy::SecretString;
use std::collections::HashMap;
use std::env;
use std::time::Duration;

/// Default base image.
pub const DEFAULT_IMAGE: &str = "postgres";

/// Default base image tag.
pub const DEFAULT_TAG: &str = "16-alpine";

/// Database created in every instance.
pub const DATABASE_NAME: &str = "customer_test";

/// Administrative user of every instance.
pub const DATABASE_USER: &str = "customer";

/// Administrative password of every instance.
pub const DATABASE_PASSWORD: &str = "password";

/// Default readiness timeout in seconds.
pub const DEFAULT_READINESS_TIMEOUT_SECS: u64 = 60;

/// Upper bound for the readiness timeout in seconds.
pub const MAX_READINESS_TIMEOUT_SECS: u64 = 600;

/// What to do with the instance when a migration fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationFailurePolicy {
    /// Leave the container running with its partially migrated schema and
    /// log its address. It must be removed by hand.
    Keep,
    /// Remove the container.
    Teardown,
}

/// Settings for one disposable instance.
#[derive(Debug, Clone)]
pub struct HarnessSettings {
    pub image: String,
    pub tag: String,
    pub database: String,
    pub username: String,
    pub password: SecretString,
    /// Bound on container start plus the first successful connection.
    pub readiness_timeout: Duration,
    pub on_migration_failure: MigrationFailurePolicy,
}

impl Default for HarnessSettings {
    fn default() -> Self {
        Self {
            image: DEFAULT_IMAGE.to_string(),
            tag: DEFAULT_TAG.to_string(),
            database: DATABASE_NAME.to_string(),
            username: DATABASE_USER.to_string(),
            password: SecretString::from(DATABASE_PASSWORD),
            readiness_timeout: Duration::from_secs(DEFAULT_READINESS_TIMEOUT_SECS),
            on_migration_failure: MigrationFailurePolicy::Keep,
        }
    }
}

impl HarnessSettings {
    /// Load settings from environment variables.
    pub fn from_env() -> Result<Self, HarnessError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load settings from a HashMap (for testing).
    ///
    /// Recognized variables:
    /// - `HARNESS_POSTGRES_IMAGE`
    /// - `HARNESS_POSTGRES_TAG`
    /// - `HARNESS_READINESS_TIMEOUT_SECS`
    /// - `HARNESS_ON_MIGRATION_FAILURE` (`keep` or `teardown`)
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, HarnessError> {
        let mut settings = Self::default();

        if let Some(image) = vars.get("HARNESS_POSTGRES_IMAGE") {
            settings.image = image.clone();
        }

        if let Some(tag) = vars.get("HARNESS_POSTGRES_TAG") {
            settings.tag = tag.clone();
        }

        if let Some(value_str) = vars.get("HARNESS_READINESS_TIMEOUT_SECS") {
            let value: u64 = value_str.parse().map_err(|e| {
                HarnessError::Configuration(format!(
                    "HARNESS_READINESS_TIMEOUT_SECS must be a valid positive integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value == 0 || value > MAX_READINESS_TIMEOUT_SECS {
                return Err(HarnessError::Configuration(format!(
                    "HARNESS_READINESS_TIMEOUT_SECS must be between 1 and {}, got {}",
                    MAX_READINESS_TIMEOUT_SECS, value
                )));
            }

            settings.readiness_timeout = Duration::from_secs(value);
        }

        if let Some(value) = vars.get("HARNESS_ON_MIGRATION_FAILURE") {
            settings.on_migration_failure = match value.to_ascii_lowercase().as_str() {
                "keep" => MigrationFailurePolicy::Keep,
                "teardown" => MigrationFailurePolicy::Teardown,
                other => {
                    return Err(HarnessError::Configuration(format!(
                        "HARNESS_ON_MIGRATION_FAILURE must be 'keep' or 'teardown', got '{}'",
                        other
                    )))
                }
            };
        }

        Ok(settings)
    }

    /// `image:tag` reference of the base image.
    pub fn image_ref(&self) -> String {
        format!("{}:{}", self.image, self.tag)
    }

    #[must_use]
    pub fn with_readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_migration_failure_policy(mut self, policy: MigrationFailurePolicy) -> Self {
        self.on_migration_failure = policy;
        self
    }
}
