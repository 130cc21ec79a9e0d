//! Object storage for customer profile images.
//!
//! The service talks to object storage only through [`ObjectStorageClient`].
//! No networked implementation ships with this crate: a deployment supplies
//! one through the binding table, and tests supply an in-memory double.

use crate::errors::CustomerError;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use tracing::instrument;

/// Minimal object-storage operations used by the service.
#[async_trait::async_trait]
pub trait ObjectStorageClient: Send + Sync {
    /// Store `body` under `key` in `bucket`, replacing any existing object.
    async fn put_object(&self, bucket: &str, key: &str, body: Bytes) -> Result<(), CustomerError>;

    /// Fetch the object stored under `key` in `bucket`.
    ///
    /// Returns `CustomerError::NotFound` when the object does not exist.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes, CustomerError>;
}

/// Bucket names used by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Buckets {
    /// Bucket holding customer profile images.
    pub customer: String,
}

/// Object storage bound to a client implementation.
#[derive(Clone)]
pub struct S3Service {
    client: Arc<dyn ObjectStorageClient>,
    buckets: S3Buckets,
}

impl fmt::Debug for S3Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Service")
            .field("buckets", &self.buckets)
            .finish_non_exhaustive()
    }
}

impl S3Service {
    pub fn new(client: Arc<dyn ObjectStorageClient>, buckets: S3Buckets) -> Self {
        Self { client, buckets }
    }

    pub fn buckets(&self) -> &S3Buckets {
        &self.buckets
    }

    #[instrument(skip(self, body), fields(len = body.len()))]
    pub async fn put_object(&self, bucket: &str, key: &str, body: Bytes) -> Result<(), CustomerError> {
        self.client.put_object(bucket, key, body).await
    }

    #[instrument(skip(self))]
    pub async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes, CustomerError> {
        self.client.get_object(bucket, key).await
    }
}

/// Object key of a customer's profile image.
pub fn profile_image_key(customer_id: impl fmt::Display, image_id: impl fmt::Display) -> String {
    format!("profile-images/{}/{}", customer_id, image_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_image_key_layout() {
        assert_eq!(profile_image_key(7, "abc"), "profile-images/7/abc");
    }
}
