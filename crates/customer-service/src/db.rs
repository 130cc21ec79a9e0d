//! Connection pool and embedded migrations.

use crate::config::Config;
use crate::errors::CustomerError;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{error, info, instrument};

/// Versioned schema migrations, embedded from the workspace `migrations/` directory.
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// Open the service's connection pool.
#[instrument(skip_all, name = "cs.db.connect")]
pub async fn connect(config: &Config) -> Result<PgPool, CustomerError> {
    let options = config.connect_options()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect_with(options)
        .await
        .map_err(|e| {
            error!(target: "cs.db", error = %e, "Failed to connect to database");
            CustomerError::Database(e.to_string())
        })?;

    info!(target: "cs.db", "Database connection established");
    Ok(pool)
}

/// Apply embedded migrations that have not been applied yet.
#[instrument(skip_all, name = "cs.db.migrate")]
pub async fn run_migrations(pool: &PgPool) -> Result<(), CustomerError> {
    MIGRATOR.run(pool).await.map_err(|e| {
        error!(target: "cs.db", error = %e, "Boot-time migration failed");
        CustomerError::Database(format!("Migration failed: {}", e))
    })
}
