//! Disposable PostgreSQL instance.
//!
//! One [`PostgresInstance`] serves every test case of a suite. Readiness is
//! published on a `watch` channel so configuration suppliers and the raw
//! client read the instance's current state instead of a copy taken too
//! early.

use crate::error::HarnessError;
use crate::settings::HarnessSettings;
use common::time_zone::{session_options, with_utc_time_zone};
use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::PgConnectOptions;
use sqlx::{ConnectOptions, Connection};
use std::fmt;
use std::time::Duration;
use testcontainers::core::{IntoContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

/// Port PostgreSQL listens on inside the container.
pub const POSTGRES_PORT: u16 = 5432;

/// Log line emitted once the server accepts connections.
const READY_MESSAGE: &str = "database system is ready to accept connections";

/// Delay between `SELECT 1` probes.
const PROBE_INTERVAL: Duration = Duration::from_millis(250);

/// Where a ready instance can be reached from the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseAddress {
    pub host: String,
    pub port: u16,
    pub database: String,
}

impl DatabaseAddress {
    /// `postgres://host:port/database` with the UTC session qualifier.
    pub fn url(&self) -> String {
        with_utc_time_zone(&format!(
            "postgres://{}:{}/{}",
            self.host, self.port, self.database
        ))
    }
}

impl fmt::Display for DatabaseAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.host, self.port, self.database)
    }
}

/// Administrative credentials fixed at provisioning time.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

/// Everything needed to open a connection to a ready instance.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub address: DatabaseAddress,
    pub credentials: Credentials,
}

impl ConnectionInfo {
    /// Connection options with the session time zone pinned to UTC.
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.address.host)
            .port(self.address.port)
            .database(&self.address.database)
            .username(&self.credentials.username)
            .password(self.credentials.password.expose_secret())
            .options(session_options())
    }
}

/// A container the harness stopped owning but left running.
///
/// Removing it is up to whoever inspects it.
#[derive(Debug, Clone)]
pub struct DetachedInstance {
    pub container_id: String,
    pub connection: ConnectionInfo,
}

impl fmt::Display for DetachedInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "container {} at {}",
            self.container_id, self.connection.address
        )
    }
}

/// Readiness state of an instance.
#[derive(Debug, Clone)]
pub enum InstanceState {
    Starting,
    Ready(ConnectionInfo),
    Terminated,
}

/// Read-only view of an instance's state.
///
/// Cheap to clone. Every read observes the instance as it is now.
#[derive(Debug, Clone)]
pub struct InstanceHandle {
    receiver: watch::Receiver<InstanceState>,
}

impl InstanceHandle {
    /// Wrap an existing receiver, e.g. one driven by hand in unit tests.
    pub fn from_watch_receiver(receiver: watch::Receiver<InstanceState>) -> Self {
        Self { receiver }
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.receiver.borrow(), InstanceState::Ready(_))
    }

    /// Connection info of the instance.
    ///
    /// # Errors
    ///
    /// `HarnessError::NotReady` while starting or after termination.
    pub fn connection_info(&self) -> Result<ConnectionInfo, HarnessError> {
        match &*self.receiver.borrow() {
            InstanceState::Ready(info) => Ok(info.clone()),
            InstanceState::Starting | InstanceState::Terminated => Err(HarnessError::NotReady),
        }
    }
}

/// Owner of one disposable PostgreSQL container.
pub struct PostgresInstance {
    settings: HarnessSettings,
    container: Option<ContainerAsync<GenericImage>>,
    state: watch::Sender<InstanceState>,
}

impl fmt::Debug for PostgresInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresInstance")
            .field("image", &self.settings.image_ref())
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl PostgresInstance {
    /// Create an instance in the `Starting` state. Nothing runs until
    /// [`start`](Self::start).
    pub fn new(settings: HarnessSettings) -> Self {
        let (state, _) = watch::channel(InstanceState::Starting);
        Self {
            settings,
            container: None,
            state,
        }
    }

    pub fn settings(&self) -> &HarnessSettings {
        &self.settings
    }

    pub fn handle(&self) -> InstanceHandle {
        InstanceHandle::from_watch_receiver(self.state.subscribe())
    }

    /// Start the container and wait until it accepts connections.
    ///
    /// A no-op on a ready instance.
    ///
    /// # Errors
    ///
    /// `HarnessError::Provisioning` if the container cannot be started, does
    /// not become reachable within the readiness timeout, or was already
    /// stopped.
    #[instrument(skip_all, name = "harness.container.start", fields(image = %self.settings.image_ref()))]
    pub async fn start(&mut self) -> Result<(), HarnessError> {
        let current = self.state.borrow().clone();
        match current {
            InstanceState::Ready(_) => {
                debug!(target: "harness.container", "Instance already running");
                return Ok(());
            }
            InstanceState::Terminated => {
                return Err(HarnessError::Provisioning(
                    "instance was stopped; start a new one".to_string(),
                ));
            }
            InstanceState::Starting => {}
        }

        let timeout = self.settings.readiness_timeout;
        info!(target: "harness.container", timeout_secs = timeout.as_secs(), "Starting PostgreSQL container");

        let (container, info) = tokio::time::timeout(timeout, provision(&self.settings))
            .await
            .map_err(|_| {
                error!(target: "harness.container", timeout_secs = timeout.as_secs(), "Instance did not become ready in time");
                HarnessError::Provisioning(format!(
                    "instance not ready after {}s",
                    timeout.as_secs()
                ))
            })??;

        info!(target: "harness.container", address = %info.address, "PostgreSQL container ready");
        self.container = Some(container);
        self.state.send_replace(InstanceState::Ready(info));
        Ok(())
    }

    /// # Errors
    ///
    /// `HarnessError::NotReady` unless the instance is ready.
    pub fn connection_address(&self) -> Result<DatabaseAddress, HarnessError> {
        self.connection_info().map(|info| info.address)
    }

    /// # Errors
    ///
    /// `HarnessError::NotReady` unless the instance is ready.
    pub fn credentials(&self) -> Result<Credentials, HarnessError> {
        self.connection_info().map(|info| info.credentials)
    }

    /// # Errors
    ///
    /// `HarnessError::NotReady` unless the instance is ready.
    pub fn connection_info(&self) -> Result<ConnectionInfo, HarnessError> {
        match &*self.state.borrow() {
            InstanceState::Ready(info) => Ok(info.clone()),
            InstanceState::Starting | InstanceState::Terminated => Err(HarnessError::NotReady),
        }
    }

    /// Remove the container. Safe to call more than once.
    ///
    /// Removal failures are logged; the instance is terminated either way.
    #[instrument(skip_all, name = "harness.container.stop")]
    pub async fn stop(&mut self) {
        if let Some(container) = self.container.take() {
            let id = container.id().to_string();
            match container.rm().await {
                Ok(()) => info!(target: "harness.container", container_id = %id, "Container removed"),
                Err(e) => {
                    warn!(target: "harness.container", container_id = %id, error = %e, "Failed to remove container");
                }
            }
        } else {
            debug!(target: "harness.container", "No container to remove");
        }
        self.state.send_replace(InstanceState::Terminated);
    }

    /// Give up ownership of the container and leave it running.
    ///
    /// Used when a failed migration should stay inspectable. The container is
    /// never removed by the harness afterwards. `None` if nothing was running.
    pub fn detach(mut self) -> Option<DetachedInstance> {
        let connection = self.connection_info().ok();
        let container = self.container.take()?;
        let detached = connection.map(|connection| DetachedInstance {
            container_id: container.id().to_string(),
            connection,
        });
        warn!(
            target: "harness.container",
            container_id = %container.id(),
            address = ?detached.as_ref().map(|d| d.connection.address.to_string()),
            "Leaving container running for inspection; remove it manually"
        );
        let _ = Box::leak(Box::new(container));
        detached
    }
}

impl Drop for PostgresInstance {
    fn drop(&mut self) {
        // The container removes itself when dropped
        if self.container.is_some() {
            self.state.send_replace(InstanceState::Terminated);
        }
    }
}

async fn provision(
    settings: &HarnessSettings,
) -> Result<(ContainerAsync<GenericImage>, ConnectionInfo), HarnessError> {
    let container = GenericImage::new(settings.image.clone(), settings.tag.clone())
        .with_exposed_port(POSTGRES_PORT.tcp())
        .with_wait_for(WaitFor::message_on_stderr(READY_MESSAGE))
        .with_env_var("POSTGRES_DB", settings.database.clone())
        .with_env_var("POSTGRES_USER", settings.username.clone())
        .with_env_var("POSTGRES_PASSWORD", settings.password.expose_secret().to_string())
        .with_startup_timeout(settings.readiness_timeout)
        .start()
        .await
        .map_err(|e| {
            error!(target: "harness.container", error = %e, "Failed to start container");
            HarnessError::Provisioning(format!("failed to start container: {}", e))
        })?;

    let host = container
        .get_host()
        .await
        .map_err(|e| HarnessError::Provisioning(format!("failed to read container host: {}", e)))?;
    let port = container
        .get_host_port_ipv4(POSTGRES_PORT.tcp())
        .await
        .map_err(|e| HarnessError::Provisioning(format!("failed to read mapped port: {}", e)))?;

    let info = ConnectionInfo {
        address: DatabaseAddress {
            host: host.to_string(),
            port,
            database: settings.database.clone(),
        },
        credentials: Credentials {
            username: settings.username.clone(),
            password: settings.password.clone(),
        },
    };

    wait_until_accepting(&info).await;
    Ok((container, info))
}

/// Probe with `SELECT 1` until a connection succeeds.
///
/// The image logs the ready message once during init before restarting, so
/// the log line alone is not enough. Bounded by the caller's timeout.
async fn wait_until_accepting(info: &ConnectionInfo) {
    let options = info.connect_options().disable_statement_logging();
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match probe(&options).await {
            Ok(()) => {
                debug!(target: "harness.container", attempt, "Readiness probe succeeded");
                return;
            }
            Err(e) => {
                debug!(target: "harness.container", attempt, error = %e, "Readiness probe failed");
                tokio::time::sleep(PROBE_INTERVAL).await;
            }
        }
    }
}

async fn probe(options: &PgConnectOptions) -> Result<(), sqlx::Error> {
    let mut conn = options.connect().await?;
    sqlx::query("SELECT 1").execute(&mut conn).await?;
    conn.close().await
}
