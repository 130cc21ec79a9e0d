//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports types from the [`secrecy`] crate. Database passwords, customer
//! passwords and object-storage credentials are held as `SecretString` so a
//! derived `Debug` on any struct carrying them prints a redaction marker
//! instead of the value.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct DatabaseCredentials {
//!     username: String,
//!     password: SecretString,
//! }
//!
//! let creds = DatabaseCredentials {
//!     username: "customer".to_string(),
//!     password: SecretString::from("password"),
//! };
//!
//! assert!(!format!("{creds:?}").contains("\"password\""));
//! assert_eq!(creds.password.expose_secret(), "password");
//! ```
//!
//! Secrets are zeroized when dropped.

pub use secrecy::{ExposeSecret, SecretString};
