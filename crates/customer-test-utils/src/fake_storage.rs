//! In-memory object storage.

use bytes::Bytes;
use customer_service::errors::CustomerError;
use customer_service::storage::ObjectStorageClient;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageOperation {
    Put,
    Get,
}

/// One call made against the fake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub operation: StorageOperation,
    pub bucket: String,
    pub key: String,
    /// Body size for `Put`; `None` for `Get`.
    pub bytes: Option<usize>,
}

/// Object storage double.
///
/// Keeps objects in memory and records every call, including calls that
/// fail. Never touches the network.
#[derive(Debug, Default)]
pub struct FakeObjectStorageClient {
    objects: Mutex<HashMap<(String, String), Bytes>>,
    calls: Mutex<Vec<RecordedCall>>,
    failure: Option<String>,
}

impl FakeObjectStorageClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call fails with `CustomerError::Storage(message)`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    /// Pre-load an object.
    #[must_use]
    pub fn with_object(self, bucket: &str, key: &str, body: impl Into<Bytes>) -> Self {
        lock(&self.objects).insert((bucket.to_string(), key.to_string()), body.into());
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// Stored object, if any. Not recorded as a call.
    pub fn object(&self, bucket: &str, key: &str) -> Option<Bytes> {
        lock(&self.objects)
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    fn record(&self, operation: StorageOperation, bucket: &str, key: &str, bytes: Option<usize>) {
        lock(&self.calls).push(RecordedCall {
            operation,
            bucket: bucket.to_string(),
            key: key.to_string(),
            bytes,
        });
    }
}

// A panicking test must not poison the fake for later assertions.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait::async_trait]
impl ObjectStorageClient for FakeObjectStorageClient {
    async fn put_object(&self, bucket: &str, key: &str, body: Bytes) -> Result<(), CustomerError> {
        self.record(StorageOperation::Put, bucket, key, Some(body.len()));

        if let Some(message) = &self.failure {
            return Err(CustomerError::Storage(message.clone()));
        }

        lock(&self.objects).insert((bucket.to_string(), key.to_string()), body);
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes, CustomerError> {
        self.record(StorageOperation::Get, bucket, key, None);

        if let Some(message) = &self.failure {
            return Err(CustomerError::Storage(message.clone()));
        }

        self.object(bucket, key)
            .ok_or_else(|| CustomerError::NotFound(format!("object {}/{}", bucket, key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_then_get() {
        let fake = FakeObjectStorageClient::new();

        fake.put_object("test-bucket", "a/b", Bytes::from_static(b"img"))
            .await
            .unwrap();
        let body = fake.get_object("test-bucket", "a/b").await.unwrap();

        assert_eq!(body, Bytes::from_static(b"img"));
        assert_eq!(
            fake.calls(),
            vec![
                RecordedCall {
                    operation: StorageOperation::Put,
                    bucket: "test-bucket".to_string(),
                    key: "a/b".to_string(),
                    bytes: Some(3),
                },
                RecordedCall {
                    operation: StorageOperation::Get,
                    bucket: "test-bucket".to_string(),
                    key: "a/b".to_string(),
                    bytes: None,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_object_is_not_found() {
        let fake = FakeObjectStorageClient::new();
        let err = fake.get_object("test-bucket", "missing").await.unwrap_err();
        assert!(matches!(err, CustomerError::NotFound(_)));
        assert_eq!(fake.call_count(), 1);
    }

    #[tokio::test]
    async fn test_canned_object() {
        let fake = FakeObjectStorageClient::new().with_object("b", "k", "canned");
        assert_eq!(fake.get_object("b", "k").await.unwrap(), "canned");
    }

    #[tokio::test]
    async fn test_failing_mode_records_and_fails() {
        let fake = FakeObjectStorageClient::failing("unavailable");

        let err = fake
            .put_object("b", "k", Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, CustomerError::Storage(msg) if msg == "unavailable"));
        assert_eq!(fake.call_count(), 1);
        assert!(fake.object("b", "k").is_none());
    }
}
