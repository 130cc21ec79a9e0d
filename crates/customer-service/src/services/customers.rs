//! Customer operations that touch collaborators beyond the database.

use crate::crypto::PasswordEncoder;
use crate::errors::CustomerError;
use crate::models::{CustomerRow, NewCustomer};
use crate::repositories::CustomersRepository;
use crate::storage::{profile_image_key, S3Service};
use bytes::Bytes;
use common::secret::{ExposeSecret, SecretString};
use common::types::{CustomerId, ProfileImageId};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, instrument};

/// Customer registration, login checks and profile images.
#[derive(Clone)]
pub struct CustomerService {
    pool: PgPool,
    storage: S3Service,
    password_encoder: Arc<dyn PasswordEncoder>,
}

impl CustomerService {
    pub fn new(
        pool: PgPool,
        storage: S3Service,
        password_encoder: Arc<dyn PasswordEncoder>,
    ) -> Self {
        Self {
            pool,
            storage,
            password_encoder,
        }
    }

    /// Register a customer, storing the encoded password.
    ///
    /// # Errors
    ///
    /// - `CustomerError::Conflict` - email already registered
    /// - `CustomerError::Crypto` - password encoding failed
    #[instrument(skip_all, fields(email = %customer.email))]
    pub async fn register(
        &self,
        customer: NewCustomer,
        password: &SecretString,
    ) -> Result<CustomerRow, CustomerError> {
        if CustomersRepository::find_by_email(&self.pool, &customer.email)
            .await?
            .is_some()
        {
            return Err(CustomerError::Conflict(format!(
                "email {} already taken",
                customer.email
            )));
        }

        let encoded = self.password_encoder.encode(password.expose_secret())?;
        let row = CustomersRepository::insert(&self.pool, &customer, &encoded).await?;

        info!(target: "cs.customers", customer_id = %row.id, "Customer registered");
        Ok(row)
    }

    /// Check a login attempt. Unknown emails are reported as a mismatch.
    #[instrument(skip_all)]
    pub async fn verify_password(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<bool, CustomerError> {
        match CustomersRepository::find_by_email(&self.pool, email).await? {
            Some(row) => self
                .password_encoder
                .matches(password.expose_secret(), &row.password),
            None => Ok(false),
        }
    }

    /// Store a profile image and record its id on the customer.
    #[instrument(skip(self, image), fields(len = image.len()))]
    pub async fn upload_profile_image(
        &self,
        customer_id: CustomerId,
        image: Bytes,
    ) -> Result<ProfileImageId, CustomerError> {
        self.require_customer(customer_id).await?;

        let image_id = ProfileImageId::new();
        let bucket = &self.storage.buckets().customer;
        self.storage
            .put_object(bucket, &profile_image_key(customer_id, image_id), image)
            .await?;

        if !CustomersRepository::set_profile_image_id(&self.pool, customer_id, image_id).await? {
            return Err(CustomerError::NotFound(format!("customer {}", customer_id)));
        }

        info!(target: "cs.customers", customer_id = %customer_id, image_id = %image_id, "Profile image uploaded");
        Ok(image_id)
    }

    /// Fetch a customer's profile image.
    #[instrument(skip(self))]
    pub async fn download_profile_image(
        &self,
        customer_id: CustomerId,
    ) -> Result<Bytes, CustomerError> {
        let customer = self.require_customer(customer_id).await?;

        let image_id = customer.profile_image_id.ok_or_else(|| {
            CustomerError::NotFound(format!("profile image for customer {}", customer_id))
        })?;

        let bucket = &self.storage.buckets().customer;
        self.storage
            .get_object(bucket, &profile_image_key(customer_id, image_id))
            .await
    }

    async fn require_customer(&self, customer_id: CustomerId) -> Result<CustomerRow, CustomerError> {
        CustomersRepository::find_by_id(&self.pool, customer_id)
            .await?
            .ok_or_else(|| CustomerError::NotFound(format!("customer {}", customer_id)))
    }
}
