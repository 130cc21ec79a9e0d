//! Dependency resolution for collaborators that are not the database.
//!
//! Boot resolves each [`Capability`] by consulting a [`BindingTable`] first
//! and falling back to the production binding only when the table has no
//! entry. A capability with neither fails boot with
//! `CustomerError::UnresolvedDependency`; nothing is silently replaced by a
//! real external call.
//!
//! Production bindings:
//!
//! | Capability          | Production binding                      |
//! |---------------------|-----------------------------------------|
//! | ObjectStorageClient | none (must be bound by the deployment)  |
//! | BucketName          | `S3_BUCKET_CUSTOMER`, when configured   |
//! | PasswordEncoder     | bcrypt with `BCRYPT_COST`               |

use crate::config::Config;
use crate::crypto::{BcryptPasswordEncoder, PasswordEncoder};
use crate::errors::CustomerError;
use crate::storage::{ObjectStorageClient, S3Buckets, S3Service};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// A collaborator the service needs at boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    ObjectStorageClient,
    BucketName,
    PasswordEncoder,
}

impl Capability {
    pub const ALL: [Capability; 3] = [
        Capability::ObjectStorageClient,
        Capability::BucketName,
        Capability::PasswordEncoder,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::ObjectStorageClient => "object-storage client",
            Capability::BucketName => "bucket name",
            Capability::PasswordEncoder => "password encoder",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An implementation (or fixed value) for one capability.
#[derive(Clone)]
pub enum Binding {
    ObjectStorage(Arc<dyn ObjectStorageClient>),
    BucketName(String),
    PasswordEncoder(Arc<dyn PasswordEncoder>),
}

impl Binding {
    pub fn capability(&self) -> Capability {
        match self {
            Binding::ObjectStorage(_) => Capability::ObjectStorageClient,
            Binding::BucketName(_) => Capability::BucketName,
            Binding::PasswordEncoder(_) => Capability::PasswordEncoder,
        }
    }

    fn into_object_storage(self) -> Option<Arc<dyn ObjectStorageClient>> {
        match self {
            Binding::ObjectStorage(client) => Some(client),
            _ => None,
        }
    }

    fn into_bucket_name(self) -> Option<String> {
        match self {
            Binding::BucketName(name) => Some(name),
            _ => None,
        }
    }

    fn into_password_encoder(self) -> Option<Arc<dyn PasswordEncoder>> {
        match self {
            Binding::PasswordEncoder(encoder) => Some(encoder),
            _ => None,
        }
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::ObjectStorage(_) => f.write_str("ObjectStorage(..)"),
            Binding::BucketName(name) => f.debug_tuple("BucketName").field(name).finish(),
            Binding::PasswordEncoder(_) => f.write_str("PasswordEncoder(..)"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WiringError {
    #[error("{0} is already bound")]
    AlreadyBound(Capability),
}

/// Override bindings consulted before production wiring.
///
/// Each capability can be bound once.
#[derive(Debug, Default, Clone)]
pub struct BindingTable {
    entries: HashMap<Capability, Binding>,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a capability.
    ///
    /// # Errors
    ///
    /// Returns `WiringError::AlreadyBound` if the capability already has a binding.
    pub fn bind(&mut self, binding: Binding) -> Result<(), WiringError> {
        let capability = binding.capability();
        if self.entries.contains_key(&capability) {
            return Err(WiringError::AlreadyBound(capability));
        }
        self.entries.insert(capability, binding);
        Ok(())
    }

    pub fn get(&self, capability: Capability) -> Option<&Binding> {
        self.entries.get(&capability)
    }

    pub fn is_bound(&self, capability: Capability) -> bool {
        self.entries.contains_key(&capability)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Collaborators resolved at boot.
#[derive(Clone)]
pub struct Dependencies {
    pub storage: S3Service,
    pub password_encoder: Arc<dyn PasswordEncoder>,
}

impl fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependencies")
            .field("storage", &self.storage)
            .finish_non_exhaustive()
    }
}

/// Resolve every capability from the table, then from production wiring.
///
/// # Errors
///
/// - `CustomerError::UnresolvedDependency` - no binding and no production wiring
/// - `CustomerError::Crypto` - the production password encoder rejected its cost
pub fn resolve(table: &BindingTable, config: &Config) -> Result<Dependencies, CustomerError> {
    let client = lookup(table, config, Capability::ObjectStorageClient)?
        .and_then(Binding::into_object_storage)
        .ok_or(CustomerError::UnresolvedDependency(Capability::ObjectStorageClient))?;

    let customer_bucket = lookup(table, config, Capability::BucketName)?
        .and_then(Binding::into_bucket_name)
        .ok_or(CustomerError::UnresolvedDependency(Capability::BucketName))?;

    let password_encoder = lookup(table, config, Capability::PasswordEncoder)?
        .and_then(Binding::into_password_encoder)
        .ok_or(CustomerError::UnresolvedDependency(Capability::PasswordEncoder))?;

    Ok(Dependencies {
        storage: S3Service::new(
            client,
            S3Buckets {
                customer: customer_bucket,
            },
        ),
        password_encoder,
    })
}

fn lookup(
    table: &BindingTable,
    config: &Config,
    capability: Capability,
) -> Result<Option<Binding>, CustomerError> {
    if let Some(binding) = table.get(capability) {
        debug!(target: "cs.wiring", capability = %capability, "Using override binding");
        return Ok(Some(binding.clone()));
    }

    let binding = production_binding(config, capability)?;
    if binding.is_some() {
        debug!(target: "cs.wiring", capability = %capability, "Using production binding");
    }
    Ok(binding)
}

fn production_binding(
    config: &Config,
    capability: Capability,
) -> Result<Option<Binding>, CustomerError> {
    Ok(match capability {
        Capability::ObjectStorageClient => None,
        Capability::BucketName => config.customer_bucket.clone().map(Binding::BucketName),
        Capability::PasswordEncoder => Some(Binding::PasswordEncoder(Arc::new(
            BcryptPasswordEncoder::new(config.bcrypt_cost)?,
        ))),
    })
}
