//! Bucket storage backends.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::http::Response;

/// A set of named buckets, each mapping request URLs to responses.
///
/// Every operation is idempotent per key; backends only need to make a
/// single `put` or `put_all` atomic.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Create the bucket if it does not exist yet.
    async fn open(&self, bucket: &str) -> Result<(), StorageError>;

    /// Names of every existing bucket.
    async fn keys(&self) -> Result<Vec<String>, StorageError>;

    /// Remove a bucket and all its entries. Returns whether it existed.
    async fn delete(&self, bucket: &str) -> Result<bool, StorageError>;

    async fn lookup(&self, bucket: &str, key: &str) -> Result<Option<Response>, StorageError>;

    /// Store a response, replacing any previous entry. Creates the bucket if needed.
    async fn put(&self, bucket: &str, key: &str, response: Response) -> Result<(), StorageError>;

    /// Store every entry or none of them.
    async fn put_all(
        &self,
        bucket: &str,
        entries: Vec<(String, Response)>,
    ) -> Result<(), StorageError>;

    /// Keys stored in a bucket, sorted. Empty if the bucket does not exist.
    async fn entries(&self, bucket: &str) -> Result<Vec<String>, StorageError>;
}

type Buckets = BTreeMap<String, BTreeMap<String, Response>>;

/// Process-local storage. Contents are lost when the process exits.
#[derive(Default)]
pub struct MemoryStorage {
    buckets: Mutex<Buckets>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_buckets<R>(&self, f: impl FnOnce(&mut Buckets) -> R) -> Result<R, StorageError> {
        let mut guard = self
            .buckets
            .lock()
            .map_err(|_| StorageError::Unavailable("memory storage lock poisoned".to_string()))?;
        Ok(f(&mut guard))
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn open(&self, bucket: &str) -> Result<(), StorageError> {
        self.with_buckets(|b| {
            b.entry(bucket.to_string()).or_default();
        })
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        self.with_buckets(|b| b.keys().cloned().collect())
    }

    async fn delete(&self, bucket: &str) -> Result<bool, StorageError> {
        self.with_buckets(|b| b.remove(bucket).is_some())
    }

    async fn lookup(&self, bucket: &str, key: &str) -> Result<Option<Response>, StorageError> {
        self.with_buckets(|b| b.get(bucket).and_then(|entries| entries.get(key)).cloned())
    }

    async fn put(&self, bucket: &str, key: &str, response: Response) -> Result<(), StorageError> {
        self.with_buckets(|b| {
            b.entry(bucket.to_string())
                .or_default()
                .insert(key.to_string(), response);
        })
    }

    async fn put_all(
        &self,
        bucket: &str,
        entries: Vec<(String, Response)>,
    ) -> Result<(), StorageError> {
        self.with_buckets(|b| {
            b.entry(bucket.to_string()).or_default().extend(entries);
        })
    }

    async fn entries(&self, bucket: &str) -> Result<Vec<String>, StorageError> {
        self.with_buckets(|b| {
            b.get(bucket)
                .map(|entries| entries.keys().cloned().collect())
                .unwrap_or_default()
        })
    }
}
