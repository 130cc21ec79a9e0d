//! Lazily resolved configuration for the system-under-test.
//!
//! The registry maps a key to a supplier. Suppliers run every time the key
//! is resolved, so a value derived from the instance always reflects the
//! instance's state at that moment and is never captured before it is ready.

use crate::container::InstanceHandle;
use crate::error::HarnessError;
use customer_service::config::{
    ConfigError, PropertySource, SchemaMode, DATABASE_MIGRATE_ON_BOOT, DATABASE_PASSWORD,
    DATABASE_SCHEMA_MODE, DATABASE_URL, DATABASE_USERNAME,
};
use secrecy::ExposeSecret;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Produces a property value at resolution time.
pub type Supplier = Arc<dyn Fn() -> Result<String, HarnessError> + Send + Sync>;

/// Key to supplier table.
#[derive(Clone, Default)]
pub struct DynamicPropertyRegistry {
    suppliers: BTreeMap<String, Supplier>,
}

impl fmt::Debug for DynamicPropertyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicPropertyRegistry")
            .field("keys", &self.suppliers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl DynamicPropertyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `supplier` for `key`, replacing any earlier supplier.
    pub fn add<F>(&mut self, key: impl Into<String>, supplier: F)
    where
        F: Fn() -> Result<String, HarnessError> + Send + Sync + 'static,
    {
        self.suppliers.insert(key.into(), Arc::new(supplier));
    }

    /// Run the supplier for `key`. `Ok(None)` if nothing is registered.
    ///
    /// # Errors
    ///
    /// Whatever the supplier returns, e.g. `HarnessError::NotReady`.
    pub fn resolve(&self, key: &str) -> Result<Option<String>, HarnessError> {
        self.suppliers.get(key).map(|supplier| supplier()).transpose()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.suppliers.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.suppliers.keys().map(String::as_str)
    }

    /// Resolve every key now.
    ///
    /// # Errors
    ///
    /// The first supplier error.
    pub fn snapshot(&self) -> Result<BTreeMap<String, String>, HarnessError> {
        self.suppliers
            .iter()
            .map(|(key, supplier)| supplier().map(|value| (key.clone(), value)))
            .collect()
    }
}

impl PropertySource for DynamicPropertyRegistry {
    fn property(&self, key: &str) -> Result<Option<String>, ConfigError> {
        self.resolve(key).map_err(|e| ConfigError::Unavailable {
            key: key.to_string(),
            message: e.to_string(),
        })
    }
}

/// Register the connection keys of the disposable instance.
///
/// - `DATABASE_URL`: instance URL with the UTC qualifier
/// - `DATABASE_USERNAME`, `DATABASE_PASSWORD`: administrative credentials
/// - `DATABASE_SCHEMA_MODE`: always `validate`
/// - `DATABASE_MIGRATE_ON_BOOT`: always `false`; the harness migrates
pub fn register_datasource(registry: &mut DynamicPropertyRegistry, handle: &InstanceHandle) {
    let url_handle = handle.clone();
    registry.add(DATABASE_URL, move || {
        url_handle.connection_info().map(|info| info.address.url())
    });

    let username_handle = handle.clone();
    registry.add(DATABASE_USERNAME, move || {
        username_handle
            .connection_info()
            .map(|info| info.credentials.username)
    });

    let password_handle = handle.clone();
    registry.add(DATABASE_PASSWORD, move || {
        password_handle
            .connection_info()
            .map(|info| info.credentials.password.expose_secret().to_string())
    });

    registry.add(DATABASE_SCHEMA_MODE, || {
        Ok(SchemaMode::Validate.as_str().to_string())
    });
    registry.add(DATABASE_MIGRATE_ON_BOOT, || Ok("false".to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{ConnectionInfo, Credentials, DatabaseAddress, InstanceState};
    use customer_service::config::Config;
    use secrecy::SecretString;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::watch;

    fn ready(port: u16) -> InstanceState {
        InstanceState::Ready(ConnectionInfo {
            address: DatabaseAddress {
                host: "localhost".to_string(),
                port,
                database: "customer_test".to_string(),
            },
            credentials: Credentials {
                username: "customer".to_string(),
                password: SecretString::from("password"),
            },
        })
    }

    fn datasource() -> (watch::Sender<InstanceState>, DynamicPropertyRegistry) {
        let (tx, rx) = watch::channel(InstanceState::Starting);
        let mut registry = DynamicPropertyRegistry::new();
        register_datasource(&mut registry, &InstanceHandle::from_watch_receiver(rx));
        (tx, registry)
    }

    #[test]
    fn test_supplier_runs_on_every_resolve() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let mut registry = DynamicPropertyRegistry::new();
        registry.add("KEY", move || {
            Ok(counter.fetch_add(1, Ordering::SeqCst).to_string())
        });
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert_eq!(registry.resolve("KEY").unwrap().as_deref(), Some("0"));
        assert_eq!(registry.resolve("KEY").unwrap().as_deref(), Some("1"));
        assert_eq!(registry.resolve("MISSING").unwrap(), None);
    }

    #[test]
    fn test_instance_keys_fail_before_ready() {
        let (_tx, registry) = datasource();

        assert!(matches!(
            registry.resolve(DATABASE_URL),
            Err(HarnessError::NotReady)
        ));
        assert!(matches!(
            registry.resolve(DATABASE_PASSWORD),
            Err(HarnessError::NotReady)
        ));
        // Fixed keys do not depend on the instance
        assert_eq!(
            registry.resolve(DATABASE_SCHEMA_MODE).unwrap().as_deref(),
            Some("validate")
        );
    }

    #[test]
    fn test_url_reflects_current_state() {
        let (tx, registry) = datasource();

        tx.send_replace(ready(40001));
        let first = registry.resolve(DATABASE_URL).unwrap().unwrap();
        assert!(first.starts_with("postgres://localhost:40001/customer_test"));

        tx.send_replace(ready(40002));
        let second = registry.resolve(DATABASE_URL).unwrap().unwrap();
        assert!(second.starts_with("postgres://localhost:40002/customer_test"));
    }

    #[test]
    fn test_utc_qualifier_appears_exactly_once() {
        let (tx, registry) = datasource();
        tx.send_replace(ready(40001));

        for _ in 0..3 {
            let url = registry.resolve(DATABASE_URL).unwrap().unwrap();
            assert_eq!(url.matches("TimeZone").count(), 1, "url: {}", url);
        }
    }

    #[test]
    fn test_schema_mode_and_migrate_flag_are_fixed() {
        let (tx, registry) = datasource();
        tx.send_replace(ready(40001));

        let snapshot = registry.snapshot().unwrap();
        assert_eq!(snapshot[DATABASE_SCHEMA_MODE], "validate");
        assert_eq!(snapshot[DATABASE_MIGRATE_ON_BOOT], "false");
        assert_eq!(snapshot[DATABASE_USERNAME], "customer");
        assert_eq!(snapshot.len(), 5);
    }

    #[test]
    fn test_service_config_loads_from_registry() {
        let (tx, registry) = datasource();

        let err = Config::from_source(&registry).unwrap_err();
        assert!(matches!(err, ConfigError::Unavailable { .. }));

        tx.send_replace(ready(40001));
        let config = Config::from_source(&registry).unwrap();
        assert_eq!(config.schema_mode, SchemaMode::Validate);
        assert!(!config.migrate_on_boot);
        assert_eq!(config.database_username.as_deref(), Some("customer"));

        let options = config.connect_options().unwrap();
        assert_eq!(options.get_port(), 40001);
        assert!(options
            .get_options()
            .is_some_and(|o| o.contains("TimeZone=UTC")));
    }
}
