//! Harness error types.
//!
//! None of these are retried or swallowed: each one fails the suite.

use crate::container::DetachedInstance;
use customer_service::errors::CustomerError;
use customer_service::wiring::{Capability, WiringError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    /// The container could not be started or never accepted connections.
    #[error("Provisioning failed: {0}")]
    Provisioning(String),

    /// A migration script failed. Versions applied before it stay applied.
    ///
    /// `kept` is set when the instance was left running for inspection.
    #[error(
        "Migration failed{}: {message}{}",
        .version.map(|v| format!(" at version {}", v)).unwrap_or_default(),
        .kept.as_ref().map(|k| format!("; kept {} for inspection", k)).unwrap_or_default()
    )]
    Migration {
        version: Option<i64>,
        message: String,
        kept: Option<Box<DetachedInstance>>,
    },

    /// An instance accessor was called before `start()` completed
    /// (or after `stop()`).
    #[error("Database instance is not ready")]
    NotReady,

    /// The system-under-test needs a collaborator nobody bound.
    #[error("No substitute or production binding for {0}")]
    UnresolvedDependency(Capability),

    #[error("Invalid harness configuration: {0}")]
    Configuration(String),

    #[error(transparent)]
    Wiring(#[from] WiringError),

    #[error("Database error: {0}")]
    Database(String),

    /// Any other boot failure of the system-under-test.
    #[error("Boot failed: {0}")]
    Boot(CustomerError),
}

impl HarnessError {
    /// The container left running after a failed migration, if any.
    pub fn kept_instance(&self) -> Option<&DetachedInstance> {
        match self {
            HarnessError::Migration { kept, .. } => kept.as_deref(),
            _ => None,
        }
    }
}

impl From<CustomerError> for HarnessError {
    fn from(err: CustomerError) -> Self {
        match err {
            CustomerError::UnresolvedDependency(capability) => {
                HarnessError::UnresolvedDependency(capability)
            }
            other => HarnessError::Boot(other),
        }
    }
}

impl From<sqlx::Error> for HarnessError {
    fn from(err: sqlx::Error) -> Self {
        HarnessError::Database(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{ConnectionInfo, Credentials, DatabaseAddress};
    use secrecy::SecretString;

    #[test]
    fn test_migration_message_includes_version_when_known() {
        let err = HarnessError::Migration {
            version: Some(2),
            message: "syntax error".to_string(),
            kept: None,
        };
        assert_eq!(err.to_string(), "Migration failed at version 2: syntax error");

        let err = HarnessError::Migration {
            version: None,
            message: "connection refused".to_string(),
            kept: None,
        };
        assert_eq!(err.to_string(), "Migration failed: connection refused");
        assert!(err.kept_instance().is_none());
    }

    #[test]
    fn test_migration_message_names_kept_instance() {
        let kept = DetachedInstance {
            container_id: "abc123".to_string(),
            connection: ConnectionInfo {
                address: DatabaseAddress {
                    host: "localhost".to_string(),
                    port: 40001,
                    database: "customer_test".to_string(),
                },
                credentials: Credentials {
                    username: "customer".to_string(),
                    password: SecretString::from("password"),
                },
            },
        };
        let err = HarnessError::Migration {
            version: Some(2),
            message: "syntax error".to_string(),
            kept: Some(Box::new(kept)),
        };

        let message = err.to_string();
        assert!(message.contains("abc123"), "{}", message);
        assert!(message.contains("localhost:40001/customer_test"), "{}", message);
        assert!(!message.contains("password"), "{}", message);
        assert_eq!(err.kept_instance().unwrap().connection.address.port, 40001);
    }

    #[test]
    fn test_unresolved_dependency_is_lifted_from_boot_errors() {
        let err: HarnessError =
            CustomerError::UnresolvedDependency(Capability::ObjectStorageClient).into();
        assert!(matches!(
            err,
            HarnessError::UnresolvedDependency(Capability::ObjectStorageClient)
        ));

        let err: HarnessError = CustomerError::SchemaValidation("missing table".to_string()).into();
        assert!(matches!(err, HarnessError::Boot(_)));
    }
}
