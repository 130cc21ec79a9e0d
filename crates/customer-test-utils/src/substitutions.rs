//! Test substitutes for the service's external collaborators.
//!
//! Builds the `BindingTable` that boot consults before production wiring.

use crate::error::HarnessError;
use crate::fake_storage::FakeObjectStorageClient;
use customer_service::config::MIN_BCRYPT_COST;
use customer_service::crypto::{BcryptPasswordEncoder, PasswordEncoder};
use customer_service::storage::ObjectStorageClient;
use customer_service::wiring::{Binding, BindingTable};
use std::sync::Arc;

/// Bucket name bound for every test suite.
pub const TEST_BUCKET: &str = "test-bucket";

/// Substitution entries for one suite.
#[derive(Debug, Clone, Default)]
pub struct SubstitutionRegistry {
    table: BindingTable,
    fake_storage: Option<Arc<FakeObjectStorageClient>>,
}

impl SubstitutionRegistry {
    /// An empty registry: boot falls back to production bindings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fake object storage, `test-bucket`, and a real bcrypt encoder.
    ///
    /// # Errors
    ///
    /// `HarnessError::Boot` if `bcrypt_cost` is out of range.
    pub fn test_defaults(bcrypt_cost: u32) -> Result<Self, HarnessError> {
        let encoder = BcryptPasswordEncoder::new(bcrypt_cost)?;
        Self::new()
            .with_object_storage(Arc::new(FakeObjectStorageClient::new()))?
            .with_bucket_name(TEST_BUCKET)?
            .with_password_encoder(Arc::new(encoder))
    }

    /// [`test_defaults`](Self::test_defaults) with the cheapest accepted
    /// bcrypt cost.
    pub fn fast_defaults() -> Result<Self, HarnessError> {
        Self::test_defaults(MIN_BCRYPT_COST)
    }

    /// Bind the object-storage client.
    ///
    /// # Errors
    ///
    /// `HarnessError::Wiring` if already bound.
    pub fn with_object_storage(
        mut self,
        client: Arc<FakeObjectStorageClient>,
    ) -> Result<Self, HarnessError> {
        let dyn_client: Arc<dyn ObjectStorageClient> = client.clone();
        self.table.bind(Binding::ObjectStorage(dyn_client))?;
        self.fake_storage = Some(client);
        Ok(self)
    }

    /// # Errors
    ///
    /// `HarnessError::Wiring` if already bound.
    pub fn with_bucket_name(mut self, name: impl Into<String>) -> Result<Self, HarnessError> {
        self.table.bind(Binding::BucketName(name.into()))?;
        Ok(self)
    }

    /// # Errors
    ///
    /// `HarnessError::Wiring` if already bound.
    pub fn with_password_encoder(
        mut self,
        encoder: Arc<dyn PasswordEncoder>,
    ) -> Result<Self, HarnessError> {
        self.table.bind(Binding::PasswordEncoder(encoder))?;
        Ok(self)
    }

    /// The bound fake, for asserting on recorded calls.
    pub fn fake_storage(&self) -> Option<&Arc<FakeObjectStorageClient>> {
        self.fake_storage.as_ref()
    }

    pub fn bindings(&self) -> &BindingTable {
        &self.table
    }
}
