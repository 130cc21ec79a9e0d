//! Boot sequence.
//!
//! Order matters:
//! 1. Resolve collaborators, so a missing binding fails before any I/O
//! 2. Connect the pool
//! 3. Apply embedded migrations, if `migrate_on_boot`
//! 4. Validate schema, if the mode is `validate`

use crate::config::{Config, PropertySource, SchemaMode};
use crate::errors::CustomerError;
use crate::services::CustomerService;
use crate::wiring::{self, BindingTable, Dependencies};
use crate::{db, schema};
use sqlx::PgPool;
use tracing::{error, info, instrument};

/// A booted Customer Service.
#[derive(Clone)]
pub struct AppContext {
    pub pool: PgPool,
    pub config: Config,
    pub dependencies: Dependencies,
    pub customers: CustomerService,
}

impl AppContext {
    /// Resolve configuration from `source`, then boot.
    pub async fn boot_from_source(
        source: &dyn PropertySource,
        bindings: &BindingTable,
    ) -> Result<Self, CustomerError> {
        let config = Config::from_source(source).map_err(|e| {
            error!(target: "cs.boot", error = %e, "Failed to load configuration");
            e
        })?;
        Self::boot(config, bindings).await
    }

    /// Boot with an already-loaded configuration.
    ///
    /// # Errors
    ///
    /// - `CustomerError::UnresolvedDependency` - a collaborator has no binding
    /// - `CustomerError::Database` - connection or boot-time migration failed
    /// - `CustomerError::SchemaValidation` - expected tables/columns are missing
    #[instrument(skip_all, name = "cs.boot", fields(schema_mode = config.schema_mode.as_str(), migrate_on_boot = config.migrate_on_boot))]
    pub async fn boot(config: Config, bindings: &BindingTable) -> Result<Self, CustomerError> {
        info!(target: "cs.boot", "Starting Customer Service");

        let dependencies = wiring::resolve(bindings, &config).map_err(|e| {
            error!(target: "cs.boot", error = %e, "Failed to resolve dependencies");
            e
        })?;

        let pool = db::connect(&config).await?;

        if config.migrate_on_boot {
            info!(target: "cs.boot", "Applying migrations at boot");
            db::run_migrations(&pool).await?;
        }

        if config.schema_mode == SchemaMode::Validate {
            schema::validate(&pool).await?;
        }

        let customers = CustomerService::new(
            pool.clone(),
            dependencies.storage.clone(),
            dependencies.password_encoder.clone(),
        );

        info!(target: "cs.boot", "Customer Service booted");

        Ok(Self {
            pool,
            config,
            dependencies,
            customers,
        })
    }
}
