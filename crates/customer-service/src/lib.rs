//! Customer Service Library
//!
//! The system-under-test exercised by the integration harness in
//! `customer-test-utils`. It owns customer records, hashes customer
//! passwords, and stores profile images in object storage.
//!
//! # Boot
//!
//! ```text
//! PropertySource -> Config -> BindingTable -> AppContext::boot
//! ```
//!
//! Configuration is resolved through [`config::PropertySource`] layers so a
//! harness can place its own values in front of the environment.
//! External collaborators (object storage, bucket name, password encoder)
//! are resolved through [`wiring::BindingTable`] before falling back to
//! production bindings.
//!
//! # Modules
//!
//! - `config` - Property sources and service configuration
//! - `context` - Boot sequence and application context
//! - `crypto` - Password encoding
//! - `db` - Connection pool and embedded migrations
//! - `errors` - Error types
//! - `models` - Data models
//! - `repositories` - Database access
//! - `schema` - Schema validation at boot
//! - `services` - Customer operations
//! - `storage` - Object-storage client seam
//! - `wiring` - Dependency-resolution table

pub mod config;
pub mod context;
pub mod crypto;
pub mod db;
pub mod errors;
pub mod models;
pub mod repositories;
pub mod schema;
pub mod services;
pub mod storage;
pub mod wiring;
