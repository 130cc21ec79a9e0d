//! # Customer Test Utilities
//!
//! Isolated integration-test environments for the Customer Service.
//!
//! This crate provides:
//! - Disposable PostgreSQL instances (`PostgresInstance`)
//! - Ordered schema migrations (`MigrationSet`)
//! - Lazily resolved service configuration (`DynamicPropertyRegistry`)
//! - Substitutes for external collaborators (`SubstitutionRegistry`,
//!   `FakeObjectStorageClient`)
//! - Raw database access and fake data (`DirectAccess`, `FakeData`)
//! - Suite lifecycle (`TestEnvironment`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use customer_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     TestEnvironment::scoped(HarnessSettings::from_env()?, |suite| async move {
//!         let app = suite.boot().await?;
//!         let mut fake = FakeData::new();
//!
//!         app.customers.register(fake.customer(), &fake.password()).await?;
//!
//!         let raw = suite.direct_access().await?;
//!         assert_eq!(raw.count_rows("customer").await?, 1);
//!         Ok(())
//!     })
//!     .await
//! }
//! ```

pub mod container;
pub mod direct_access;
pub mod environment;
pub mod error;
pub mod fake_data;
pub mod fake_storage;
pub mod logging;
pub mod migrator;
pub mod properties;
pub mod settings;
pub mod substitutions;

// Re-export commonly used items
pub use container::{
    ConnectionInfo, Credentials, DatabaseAddress, DetachedInstance, InstanceHandle,
    PostgresInstance,
};
pub use direct_access::{raw_client, DirectAccess};
pub use environment::{SuiteContext, TestEnvironment};
pub use error::HarnessError;
pub use fake_data::FakeData;
pub use fake_storage::{FakeObjectStorageClient, RecordedCall, StorageOperation};
pub use logging::init_test_tracing;
pub use migrator::{MigrationReport, MigrationSet};
pub use properties::{register_datasource, DynamicPropertyRegistry};
pub use settings::{HarnessSettings, MigrationFailurePolicy};
pub use substitutions::{SubstitutionRegistry, TEST_BUCKET};
