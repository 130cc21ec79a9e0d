//! Suite-level test environment.
//!
//! Sequencing is fixed: start the instance, apply migrations, then publish
//! configuration and substitutions. Tests only ever see a migrated schema.

use crate::container::{InstanceHandle, PostgresInstance};
use crate::direct_access::{self, DirectAccess};
use crate::error::HarnessError;
use crate::fake_storage::FakeObjectStorageClient;
use crate::migrator::{MigrationReport, MigrationSet};
use crate::properties::{register_datasource, DynamicPropertyRegistry};
use crate::settings::{HarnessSettings, MigrationFailurePolicy};
use crate::substitutions::SubstitutionRegistry;
use customer_service::config::{EnvSource, LayeredSource};
use customer_service::context::AppContext;
use futures::FutureExt;
use sqlx::PgPool;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{error, info, instrument};

/// What a test case needs from its suite. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SuiteContext {
    handle: InstanceHandle,
    properties: DynamicPropertyRegistry,
    substitutions: SubstitutionRegistry,
}

impl SuiteContext {
    pub fn handle(&self) -> &InstanceHandle {
        &self.handle
    }

    pub fn properties(&self) -> &DynamicPropertyRegistry {
        &self.properties
    }

    pub fn substitutions(&self) -> &SubstitutionRegistry {
        &self.substitutions
    }

    pub fn fake_storage(&self) -> Option<&Arc<FakeObjectStorageClient>> {
        self.substitutions.fake_storage()
    }

    /// Boot the service against the instance.
    ///
    /// Properties registered by the harness take precedence over the
    /// process environment; substitutions take precedence over production
    /// bindings.
    ///
    /// # Errors
    ///
    /// - `HarnessError::UnresolvedDependency` - a collaborator has no binding
    /// - `HarnessError::Boot` - configuration, connection or schema validation failed
    #[instrument(skip_all, name = "harness.boot")]
    pub async fn boot(&self) -> Result<AppContext, HarnessError> {
        let env = EnvSource;
        let source = LayeredSource::new().with(&self.properties).with(&env);
        let context = AppContext::boot_from_source(&source, self.substitutions.bindings()).await?;
        Ok(context)
    }

    /// # Errors
    ///
    /// See [`direct_access::raw_client`].
    pub async fn raw_client(&self) -> Result<PgPool, HarnessError> {
        direct_access::raw_client(&self.handle).await
    }

    /// # Errors
    ///
    /// See [`direct_access::raw_client`].
    pub async fn direct_access(&self) -> Result<DirectAccess, HarnessError> {
        DirectAccess::connect(&self.handle).await
    }
}

/// One disposable database plus everything published from it.
#[derive(Debug)]
pub struct TestEnvironment {
    instance: PostgresInstance,
    migrations: MigrationSet,
    context: SuiteContext,
    last_report: Option<MigrationReport>,
}

impl TestEnvironment {
    /// Start an instance with the service's migrations and default
    /// substitutions, without migrating.
    ///
    /// # Errors
    ///
    /// `HarnessError::Provisioning` if the instance never became ready.
    pub async fn provision(settings: HarnessSettings) -> Result<Self, HarnessError> {
        Self::provision_with(
            settings,
            MigrationSet::embedded()?,
            SubstitutionRegistry::fast_defaults()?,
        )
        .await
    }

    /// # Errors
    ///
    /// `HarnessError::Provisioning` if the instance never became ready.
    pub async fn provision_with(
        settings: HarnessSettings,
        migrations: MigrationSet,
        substitutions: SubstitutionRegistry,
    ) -> Result<Self, HarnessError> {
        let mut instance = PostgresInstance::new(settings);
        instance.start().await?;

        let handle = instance.handle();
        let mut properties = DynamicPropertyRegistry::new();
        register_datasource(&mut properties, &handle);

        Ok(Self {
            instance,
            migrations,
            context: SuiteContext {
                handle,
                properties,
                substitutions,
            },
            last_report: None,
        })
    }

    /// Apply pending migrations.
    ///
    /// # Errors
    ///
    /// `HarnessError::Migration`; earlier versions stay applied.
    pub async fn migrate(&mut self) -> Result<&MigrationReport, HarnessError> {
        let info = self.instance.connection_info()?;
        let report = self
            .migrations
            .migrate(&info.address, &info.credentials)
            .await?;
        Ok(self.last_report.insert(report))
    }

    /// Provision and migrate with the service's migrations.
    ///
    /// # Errors
    ///
    /// `HarnessError::Provisioning` or `HarnessError::Migration`. After a
    /// migration failure the instance is kept or removed according to
    /// `settings.on_migration_failure`; a kept instance is reachable through
    /// [`HarnessError::kept_instance`].
    pub async fn start(settings: HarnessSettings) -> Result<Self, HarnessError> {
        Self::start_with(
            settings,
            MigrationSet::embedded()?,
            SubstitutionRegistry::fast_defaults()?,
        )
        .await
    }

    /// # Errors
    ///
    /// See [`start`](Self::start).
    #[instrument(skip_all, name = "harness.environment.start")]
    pub async fn start_with(
        settings: HarnessSettings,
        migrations: MigrationSet,
        substitutions: SubstitutionRegistry,
    ) -> Result<Self, HarnessError> {
        let policy = settings.on_migration_failure;
        let mut env = Self::provision_with(settings, migrations, substitutions).await?;

        let migrated = env.migrate().await.map(|_| ());
        if let Err(mut e) = migrated {
            match policy {
                MigrationFailurePolicy::Keep => {
                    if let Some(detached) = env.instance.detach() {
                        error!(target: "harness.environment", container_id = %detached.container_id, address = %detached.connection.address, error = %e, "Migration failed; instance kept for inspection");
                        if let HarnessError::Migration { kept, .. } = &mut e {
                            *kept = Some(Box::new(detached));
                        }
                    }
                }
                MigrationFailurePolicy::Teardown => {
                    error!(target: "harness.environment", error = %e, "Migration failed; removing instance");
                    env.instance.stop().await;
                }
            }
            return Err(e);
        }

        info!(target: "harness.environment", "Test environment ready");
        Ok(env)
    }

    /// Run `body` against a fresh environment and always tear it down,
    /// including when `body` fails or panics.
    ///
    /// A panic in `body` is resumed after teardown.
    ///
    /// # Errors
    ///
    /// Startup errors, converted into `E`, or whatever `body` returns.
    pub async fn scoped<T, E, F, Fut>(settings: HarnessSettings, body: F) -> Result<T, E>
    where
        F: FnOnce(SuiteContext) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<HarnessError>,
    {
        let env = Self::start(settings).await?;
        let context = env.context();

        let outcome = AssertUnwindSafe(async move { body(context).await })
            .catch_unwind()
            .await;

        env.shutdown().await;

        match outcome {
            Ok(result) => result,
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    pub fn context(&self) -> SuiteContext {
        self.context.clone()
    }

    pub fn instance(&self) -> &PostgresInstance {
        &self.instance
    }

    pub fn migrations(&self) -> &MigrationSet {
        &self.migrations
    }

    /// Report of the most recent `migrate` call that succeeded.
    pub fn last_report(&self) -> Option<&MigrationReport> {
        self.last_report.as_ref()
    }

    pub fn fake_storage(&self) -> Option<&Arc<FakeObjectStorageClient>> {
        self.context.fake_storage()
    }

    /// # Errors
    ///
    /// See [`SuiteContext::boot`].
    pub async fn boot(&self) -> Result<AppContext, HarnessError> {
        self.context.boot().await
    }

    /// # Errors
    ///
    /// See [`direct_access::raw_client`].
    pub async fn raw_client(&self) -> Result<PgPool, HarnessError> {
        self.context.raw_client().await
    }

    /// # Errors
    ///
    /// See [`direct_access::raw_client`].
    pub async fn direct_access(&self) -> Result<DirectAccess, HarnessError> {
        self.context.direct_access().await
    }

    /// Remove the instance. Problems are logged, not returned.
    pub async fn shutdown(mut self) {
        self.instance.stop().await;
        info!(target: "harness.environment", "Test environment shut down");
    }
}
