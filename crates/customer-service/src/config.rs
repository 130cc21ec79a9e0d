//! Customer Service configuration.
//!
//! Configuration is resolved through one or more [`PropertySource`]s. In
//! production the only source is the process environment. Under test, a
//! harness places its own source in front of the environment with
//! [`LayeredSource`], so that values it publishes win over anything
//! configured statically. All sensitive fields are redacted in Debug output.

use common::secret::{ExposeSecret, SecretString};
use sqlx::postgres::PgConnectOptions;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Property key for the PostgreSQL connection URL.
pub const DATABASE_URL: &str = "DATABASE_URL";

/// Property key for the database username (overrides the URL's user).
pub const DATABASE_USERNAME: &str = "DATABASE_USERNAME";

/// Property key for the database password (overrides the URL's password).
pub const DATABASE_PASSWORD: &str = "DATABASE_PASSWORD";

/// Property key for the schema-management mode.
pub const DATABASE_SCHEMA_MODE: &str = "DATABASE_SCHEMA_MODE";

/// Property key for running embedded migrations at boot.
pub const DATABASE_MIGRATE_ON_BOOT: &str = "DATABASE_MIGRATE_ON_BOOT";

/// Property key for the connection pool size.
pub const DATABASE_MAX_CONNECTIONS: &str = "DATABASE_MAX_CONNECTIONS";

/// Property key for the bucket holding customer profile images.
pub const S3_BUCKET_CUSTOMER: &str = "S3_BUCKET_CUSTOMER";

/// Property key for the bcrypt cost factor.
pub const BCRYPT_COST: &str = "BCRYPT_COST";

/// Default connection pool size.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Default bcrypt cost factor (2^10 iterations).
pub const DEFAULT_BCRYPT_COST: u32 = 10;

/// Minimum accepted bcrypt cost factor.
pub const MIN_BCRYPT_COST: u32 = 10;

/// Maximum accepted bcrypt cost factor.
pub const MAX_BCRYPT_COST: u32 = 14;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required property: {0}")]
    MissingProperty(String),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Property {key} could not be resolved: {message}")]
    Unavailable { key: String, message: String },
}

/// A source of configuration properties.
///
/// `Ok(None)` means the source does not define the key and the next layer
/// should be consulted. `Err` means the source defines the key but could not
/// produce a value; resolution stops there.
pub trait PropertySource: Send + Sync {
    fn property(&self, key: &str) -> Result<Option<String>, ConfigError>;
}

impl PropertySource for HashMap<String, String> {
    fn property(&self, key: &str) -> Result<Option<String>, ConfigError> {
        Ok(self.get(key).cloned())
    }
}

/// Process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSource;

impl PropertySource for EnvSource {
    fn property(&self, key: &str) -> Result<Option<String>, ConfigError> {
        Ok(env::var(key).ok())
    }
}

/// Ordered stack of property sources; the first source defining a key wins.
#[derive(Default)]
pub struct LayeredSource<'a> {
    layers: Vec<&'a dyn PropertySource>,
}

impl<'a> LayeredSource<'a> {
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    /// Append a layer with lower precedence than every layer added so far.
    #[must_use]
    pub fn with(mut self, source: &'a dyn PropertySource) -> Self {
        self.layers.push(source);
        self
    }
}

impl PropertySource for LayeredSource<'_> {
    fn property(&self, key: &str) -> Result<Option<String>, ConfigError> {
        for layer in &self.layers {
            if let Some(value) = layer.property(key)? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }
}

/// How the service treats the database schema at boot.
///
/// The service never generates schema itself: migrations are the only
/// schema author.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaMode {
    /// Verify that the expected tables and columns exist; fail boot otherwise.
    Validate,
    /// Skip schema checks.
    None,
}

impl SchemaMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaMode::Validate => "validate",
            SchemaMode::None => "none",
        }
    }
}

impl FromStr for SchemaMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "validate" => Ok(SchemaMode::Validate),
            "none" => Ok(SchemaMode::None),
            other => Err(ConfigError::InvalidValue {
                key: DATABASE_SCHEMA_MODE.to_string(),
                message: format!("expected 'validate' or 'none', got '{}'", other),
            }),
        }
    }
}

/// Customer Service configuration.
#[derive(Clone)]
pub struct Config {
    /// PostgreSQL connection URL.
    pub database_url: String,

    /// Database username; takes precedence over the URL's user.
    pub database_username: Option<String>,

    /// Database password; takes precedence over the URL's password.
    pub database_password: Option<SecretString>,

    /// Connection pool size (default: 5).
    pub database_max_connections: u32,

    /// Schema handling at boot (default: validate).
    pub schema_mode: SchemaMode,

    /// Run embedded migrations at boot (default: true).
    pub migrate_on_boot: bool,

    /// Bucket for customer profile images, if configured.
    pub customer_bucket: Option<String>,

    /// Bcrypt cost factor for customer passwords.
    pub bcrypt_cost: u32,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &"[REDACTED]")
            .field("database_username", &self.database_username)
            .field("database_password", &"[REDACTED]")
            .field("database_max_connections", &self.database_max_connections)
            .field("schema_mode", &self.schema_mode)
            .field("migrate_on_boot", &self.migrate_on_boot)
            .field("customer_bucket", &self.customer_bucket)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(&EnvSource)
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_source(vars)
    }

    /// Load configuration from any property source.
    pub fn from_source(source: &dyn PropertySource) -> Result<Self, ConfigError> {
        let database_url = source
            .property(DATABASE_URL)?
            .ok_or_else(|| ConfigError::MissingProperty(DATABASE_URL.to_string()))?;

        let database_username = source.property(DATABASE_USERNAME)?;
        let database_password = source.property(DATABASE_PASSWORD)?.map(SecretString::from);

        let database_max_connections =
            if let Some(value_str) = source.property(DATABASE_MAX_CONNECTIONS)? {
                let value: u32 = value_str.trim().parse().map_err(|e| ConfigError::InvalidValue {
                    key: DATABASE_MAX_CONNECTIONS.to_string(),
                    message: format!("must be a positive integer, got '{}': {}", value_str, e),
                })?;

                if value == 0 {
                    return Err(ConfigError::InvalidValue {
                        key: DATABASE_MAX_CONNECTIONS.to_string(),
                        message: "must be greater than 0".to_string(),
                    });
                }

                value
            } else {
                DEFAULT_MAX_CONNECTIONS
            };

        let schema_mode = match source.property(DATABASE_SCHEMA_MODE)? {
            Some(value) => value.parse()?,
            None => SchemaMode::Validate,
        };

        let migrate_on_boot = match source.property(DATABASE_MIGRATE_ON_BOOT)? {
            Some(value) => parse_bool(DATABASE_MIGRATE_ON_BOOT, &value)?,
            None => true,
        };

        let customer_bucket = source
            .property(S3_BUCKET_CUSTOMER)?
            .filter(|bucket| !bucket.trim().is_empty());

        let bcrypt_cost = if let Some(value_str) = source.property(BCRYPT_COST)? {
            let value: u32 = value_str.trim().parse().map_err(|e| ConfigError::InvalidValue {
                key: BCRYPT_COST.to_string(),
                message: format!("must be an integer, got '{}': {}", value_str, e),
            })?;

            if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&value) {
                return Err(ConfigError::InvalidValue {
                    key: BCRYPT_COST.to_string(),
                    message: format!(
                        "must be between {} and {}, got {}",
                        MIN_BCRYPT_COST, MAX_BCRYPT_COST, value
                    ),
                });
            }

            value
        } else {
            DEFAULT_BCRYPT_COST
        };

        Ok(Config {
            database_url,
            database_username,
            database_password,
            database_max_connections,
            schema_mode,
            migrate_on_boot,
            customer_bucket,
            bcrypt_cost,
        })
    }

    /// Build connection options from the URL plus explicit credentials.
    pub fn connect_options(&self) -> Result<PgConnectOptions, ConfigError> {
        let mut options =
            PgConnectOptions::from_str(&self.database_url).map_err(|e| ConfigError::InvalidValue {
                key: DATABASE_URL.to_string(),
                message: format!("not a valid PostgreSQL URL: {}", e),
            })?;

        if let Some(username) = &self.database_username {
            options = options.username(username);
        }
        if let Some(password) = &self.database_password {
            options = options.password(password.expose_secret());
        }

        Ok(options)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got '{}'", other),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([(
            DATABASE_URL.to_string(),
            "postgres://localhost:5432/customer".to_string(),
        )])
    }

    #[test]
    fn test_from_vars_with_defaults() {
        let config = Config::from_vars(&base_vars()).expect("config should load");

        assert_eq!(config.database_url, "postgres://localhost:5432/customer");
        assert_eq!(config.database_username, None);
        assert!(config.database_password.is_none());
        assert_eq!(config.database_max_connections, DEFAULT_MAX_CONNECTIONS);
        assert_eq!(config.schema_mode, SchemaMode::Validate);
        assert!(config.migrate_on_boot);
        assert_eq!(config.customer_bucket, None);
        assert_eq!(config.bcrypt_cost, DEFAULT_BCRYPT_COST);
    }

    #[test]
    fn test_missing_database_url() {
        let err = Config::from_vars(&HashMap::new()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingProperty(key) if key == DATABASE_URL));
    }

    #[test]
    fn test_schema_mode_parsing() {
        let mut vars = base_vars();
        vars.insert(DATABASE_SCHEMA_MODE.to_string(), "NONE".to_string());
        assert_eq!(Config::from_vars(&vars).unwrap().schema_mode, SchemaMode::None);

        vars.insert(DATABASE_SCHEMA_MODE.to_string(), "create".to_string());
        let err = Config::from_vars(&vars).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == DATABASE_SCHEMA_MODE));
    }

    #[test]
    fn test_migrate_on_boot_parsing() {
        let mut vars = base_vars();
        vars.insert(DATABASE_MIGRATE_ON_BOOT.to_string(), "false".to_string());
        assert!(!Config::from_vars(&vars).unwrap().migrate_on_boot);

        vars.insert(DATABASE_MIGRATE_ON_BOOT.to_string(), "maybe".to_string());
        assert!(Config::from_vars(&vars).is_err());
    }

    #[test]
    fn test_bcrypt_cost_bounds() {
        let mut vars = base_vars();
        vars.insert(BCRYPT_COST.to_string(), "9".to_string());
        assert!(Config::from_vars(&vars).is_err());

        vars.insert(BCRYPT_COST.to_string(), "15".to_string());
        assert!(Config::from_vars(&vars).is_err());

        vars.insert(BCRYPT_COST.to_string(), "12".to_string());
        assert_eq!(Config::from_vars(&vars).unwrap().bcrypt_cost, 12);
    }

    #[test]
    fn test_zero_max_connections_rejected() {
        let mut vars = base_vars();
        vars.insert(DATABASE_MAX_CONNECTIONS.to_string(), "0".to_string());
        assert!(Config::from_vars(&vars).is_err());
    }

    #[test]
    fn test_blank_bucket_is_unset() {
        let mut vars = base_vars();
        vars.insert(S3_BUCKET_CUSTOMER.to_string(), "  ".to_string());
        assert_eq!(Config::from_vars(&vars).unwrap().customer_bucket, None);
    }

    #[test]
    fn test_layered_source_first_layer_wins() {
        let overrides = HashMap::from([(
            DATABASE_URL.to_string(),
            "postgres://override:5432/db".to_string(),
        )]);
        let mut fallback = base_vars();
        fallback.insert(S3_BUCKET_CUSTOMER.to_string(), "prod-bucket".to_string());

        let layered = LayeredSource::new().with(&overrides).with(&fallback);
        let config = Config::from_source(&layered).unwrap();

        assert_eq!(config.database_url, "postgres://override:5432/db");
        assert_eq!(config.customer_bucket.as_deref(), Some("prod-bucket"));
    }

    #[test]
    fn test_layered_source_stops_on_error() {
        struct Broken;
        impl PropertySource for Broken {
            fn property(&self, key: &str) -> Result<Option<String>, ConfigError> {
                Err(ConfigError::Unavailable {
                    key: key.to_string(),
                    message: "not ready".to_string(),
                })
            }
        }

        let fallback = base_vars();
        let layered = LayeredSource::new().with(&Broken).with(&fallback);
        let err = Config::from_source(&layered).unwrap_err();
        assert!(matches!(err, ConfigError::Unavailable { .. }));
    }

    #[test]
    fn test_debug_redacts_url_and_password() {
        let mut vars = base_vars();
        vars.insert(DATABASE_PASSWORD.to_string(), "hunter2".to_string());
        let config = Config::from_vars(&vars).unwrap();

        let debug = format!("{:?}", config);
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("localhost:5432"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_connect_options_applies_credentials() {
        let mut vars = base_vars();
        vars.insert(DATABASE_USERNAME.to_string(), "customer".to_string());
        vars.insert(DATABASE_PASSWORD.to_string(), "password".to_string());
        let config = Config::from_vars(&vars).unwrap();

        let options = config.connect_options().expect("valid url");
        assert_eq!(options.get_username(), "customer");
        assert_eq!(options.get_database(), Some("customer"));
        assert_eq!(options.get_port(), 5432);
    }

    #[test]
    fn test_connect_options_rejects_garbage_url() {
        let mut vars = base_vars();
        vars.insert(DATABASE_URL.to_string(), "not a url".to_string());
        let config = Config::from_vars(&vars).unwrap();
        assert!(config.connect_options().is_err());
    }
}
