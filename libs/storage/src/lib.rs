//! Blob storage behind an S3-compatible endpoint.
//!
//! Raw media (voice notes) and uploaded knowledge documents live here; the
//! relational store only ever holds their keys. Keys are plain
//! `{user_id}/{uuid}-{filename}` strings.

use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as BlobPath;
use object_store::{ObjectStore, PutPayload};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use vox_core::BlobConfig;

pub type SharedBlobStore = Arc<dyn BlobStore>;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("blob '{0}' not found")]
    NotFound(String),
    #[error("storage error: {0}")]
    Backend(String),
}

impl vox_retry::Retryable for StorageError {
    fn is_retriable(&self) -> bool {
        // A missing key will not appear by retrying.
        !matches!(self, StorageError::NotFound(_))
    }
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Bytes, StorageError>;
    async fn put(&self, key: &str, data: Bytes) -> Result<(), StorageError>;
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
    /// Object size in bytes without fetching the body.
    async fn size(&self, key: &str) -> Result<u64, StorageError>;
}

/// [`BlobStore`] over any S3-compatible endpoint (R2, MinIO, S3 proper).
pub struct S3BlobStore {
    store: Box<dyn ObjectStore>,
}

impl S3BlobStore {
    pub fn new(config: &BlobConfig) -> Result<Self, StorageError> {
        let store = AmazonS3Builder::new()
            .with_endpoint(&config.endpoint_url)
            .with_bucket_name(&config.bucket)
            .with_access_key_id(&config.access_key)
            .with_secret_access_key(&config.secret_key)
            .with_region("auto")
            .with_allow_http(config.endpoint_url.starts_with("http://"))
            .build()
            .map_err(|err| StorageError::Backend(err.to_string()))?;
        Ok(Self {
            store: Box::new(store),
        })
    }
}

fn map_err(key: &str, err: object_store::Error) -> StorageError {
    match err {
        object_store::Error::NotFound { .. } => StorageError::NotFound(key.to_string()),
        other => StorageError::Backend(other.to_string()),
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        let path = BlobPath::from(key);
        let result = self.store.get(&path).await.map_err(|e| map_err(key, e))?;
        result.bytes().await.map_err(|e| map_err(key, e))
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<(), StorageError> {
        let path = BlobPath::from(key);
        self.store
            .put(&path, PutPayload::from_bytes(data))
            .await
            .map_err(|e| map_err(key, e))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = BlobPath::from(key);
        self.store.delete(&path).await.map_err(|e| map_err(key, e))?;
        Ok(())
    }

    async fn size(&self, key: &str) -> Result<u64, StorageError> {
        let path = BlobPath::from(key);
        let meta = self.store.head(&path).await.map_err(|e| map_err(key, e))?;
        Ok(meta.size as u64)
    }
}

/// In-memory twin for tests.
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<Mutex<HashMap<String, Bytes>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.blobs.lock().await.contains_key(key)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        self.blobs
            .lock()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<(), StorageError> {
        self.blobs.lock().await.insert(key.to_string(), data);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.blobs.lock().await.remove(key);
        Ok(())
    }

    async fn size(&self, key: &str) -> Result<u64, StorageError> {
        self.get(key).await.map(|data| data.len() as u64)
    }
}
