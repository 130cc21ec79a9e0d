//! Ordered schema migrations against a disposable instance.
//!
//! Scripts are applied by `sqlx`'s migrator: ascending version order, one
//! transaction per script, recorded in `_sqlx_migrations` only after the
//! script succeeds. A failing script leaves every earlier version applied.

use crate::container::{ConnectionInfo, Credentials, DatabaseAddress};
use crate::error::HarnessError;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{error, info, instrument};

/// A validated set of migration scripts.
#[derive(Debug)]
pub enum MigrationSet {
    /// Compiled into the service binary.
    Embedded(&'static Migrator),
    /// Loaded from a directory at runtime.
    Loaded(Migrator),
}

/// Outcome of one `migrate` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Versions applied by this call, ascending.
    pub applied: Vec<i64>,
    /// Versions that were already recorded before this call.
    pub already_applied: Vec<i64>,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

impl MigrationSet {
    /// The service's own migrations.
    ///
    /// # Errors
    ///
    /// `HarnessError::Migration` if versions are not strictly ascending.
    pub fn embedded() -> Result<Self, HarnessError> {
        let set = Self::Embedded(&customer_service::db::MIGRATOR);
        set.check_order()?;
        Ok(set)
    }

    /// Scripts named `<version>_<description>.sql` under `dir`.
    ///
    /// # Errors
    ///
    /// `HarnessError::Migration` if the directory cannot be read or versions
    /// are not strictly ascending.
    pub async fn from_dir(dir: impl AsRef<Path>) -> Result<Self, HarnessError> {
        let dir = dir.as_ref();
        let migrator = Migrator::new(dir.to_path_buf())
            .await
            .map_err(|e| HarnessError::Migration {
                version: None,
                message: format!("failed to load {}: {}", dir.display(), e),
                kept: None,
            })?;
        let set = Self::Loaded(migrator);
        set.check_order()?;
        Ok(set)
    }

    fn migrator(&self) -> &Migrator {
        match self {
            MigrationSet::Embedded(migrator) => migrator,
            MigrationSet::Loaded(migrator) => migrator,
        }
    }

    /// Versions of the up-migrations, in application order.
    pub fn versions(&self) -> Vec<i64> {
        self.migrator()
            .iter()
            .filter(|m| !m.migration_type.is_down_migration())
            .map(|m| m.version)
            .collect()
    }

    fn check_order(&self) -> Result<(), HarnessError> {
        let versions = self.versions();
        for pair in versions.windows(2) {
            if let [previous, next] = pair {
                if next <= previous {
                    return Err(HarnessError::Migration {
                        version: Some(*next),
                        message: format!(
                            "version {} does not follow {}; versions must be strictly ascending",
                            next, previous
                        ),
                        kept: None,
                    });
                }
            }
        }
        Ok(())
    }

    /// Apply every pending script.
    ///
    /// # Errors
    ///
    /// `HarnessError::Migration` naming the failing version when it is known.
    #[instrument(skip_all, name = "harness.migrator.migrate", fields(address = %address))]
    pub async fn migrate(
        &self,
        address: &DatabaseAddress,
        credentials: &Credentials,
    ) -> Result<MigrationReport, HarnessError> {
        let info = ConnectionInfo {
            address: address.clone(),
            credentials: credentials.clone(),
        };

        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect_with(info.connect_options())
            .await
            .map_err(|e| {
                error!(target: "harness.migrator", error = %e, "Failed to connect for migrations");
                HarnessError::Migration {
                    version: None,
                    message: format!("failed to connect: {}", e),
                    kept: None,
                }
            })?;

        let result = self.apply(&pool).await;
        pool.close().await;
        result
    }

    async fn apply(&self, pool: &PgPool) -> Result<MigrationReport, HarnessError> {
        let before = applied_versions(pool).await.map_err(history_unreadable)?;
        info!(
            target: "harness.migrator",
            available = self.versions().len(),
            already_applied = before.len(),
            "Applying migrations"
        );

        if let Err(e) = self.migrator().run(pool).await {
            // The failing script rolled back, so it is the first version
            // still missing afterwards.
            let after = applied_versions(pool).await.unwrap_or(before);
            let version = self.versions().into_iter().find(|v| !after.contains(v));
            error!(target: "harness.migrator", version = ?version, error = %e, "Migration failed");
            return Err(HarnessError::Migration {
                version,
                message: e.to_string(),
                kept: None,
            });
        }

        let after = applied_versions(pool).await.map_err(history_unreadable)?;
        let report = MigrationReport {
            applied: after.difference(&before).copied().collect(),
            already_applied: before.into_iter().collect(),
        };

        if report.is_noop() {
            info!(target: "harness.migrator", "Schema already up to date");
        } else {
            info!(target: "harness.migrator", applied = ?report.applied, "Migrations applied");
        }
        Ok(report)
    }
}

/// Versions recorded as successfully applied.
async fn applied_versions(pool: &PgPool) -> Result<BTreeSet<i64>, sqlx::Error> {
    let table_exists: bool =
        sqlx::query_scalar("SELECT to_regclass('_sqlx_migrations') IS NOT NULL")
            .fetch_one(pool)
            .await?;
    if !table_exists {
        return Ok(BTreeSet::new());
    }

    let versions: Vec<i64> =
        sqlx::query_scalar("SELECT version FROM _sqlx_migrations WHERE success ORDER BY version")
            .fetch_all(pool)
            .await?;
    Ok(versions.into_iter().collect())
}

fn history_unreadable(e: sqlx::Error) -> HarnessError {
    error!(target: "harness.migrator", error = %e, "Failed to read migration history");
    HarnessError::Migration {
        version: None,
        message: format!("failed to read migration history: {}", e),
        kept: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use std::time::Duration;

    #[test]
    fn test_embedded_versions_are_ascending() {
        let set = MigrationSet::embedded().unwrap();
        assert_eq!(set.versions(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_from_dir_loads_fixture_in_order() {
        let dir = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/broken_migrations");
        let set = MigrationSet::from_dir(dir).await.unwrap();
        assert_eq!(set.versions(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_from_dir_missing_directory() {
        let result = MigrationSet::from_dir("/nonexistent/migrations").await;
        assert!(matches!(
            result,
            Err(HarnessError::Migration { version: None, .. })
        ));
    }

    #[test]
    fn test_report_noop() {
        let report = MigrationReport {
            applied: vec![],
            already_applied: vec![1, 2, 3],
        };
        assert!(report.is_noop());
    }

    #[tokio::test]
    async fn test_unreadable_history_is_migration_error() {
        let info = ConnectionInfo {
            address: DatabaseAddress {
                host: "127.0.0.1".to_string(),
                port: 1,
                database: "customer_test".to_string(),
            },
            credentials: Credentials {
                username: "customer".to_string(),
                password: SecretString::from("password"),
            },
        };
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(2))
            .connect_lazy_with(info.connect_options());

        let set = MigrationSet::embedded().unwrap();
        let err = set.apply(&pool).await.unwrap_err();
        assert!(
            matches!(err, HarnessError::Migration { version: None, kept: None, .. }),
            "got {:?}",
            err
        );
        assert!(err.to_string().contains("migration history"));
    }
}
