use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use medidoc_blob::{BlobError, BlobStore};
use medidoc_core::StorageKey;

/// In-memory [`BlobStore`] backed by a [`DashMap`].
///
/// Writes are visible as soon as `put` returns. Contents are lost on
/// restart, so this backend is meant for tests and local development.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: DashMap<StorageKey, Bytes>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, data: Bytes) -> Result<StorageKey, BlobError> {
        let key = StorageKey::generate();
        self.blobs.insert(key.clone(), data);
        Ok(key)
    }

    async fn get(&self, key: &StorageKey) -> Result<Option<Bytes>, BlobError> {
        Ok(self.blobs.get(key).map(|b| b.value().clone()))
    }

    async fn delete(&self, key: &StorageKey) -> Result<bool, BlobError> {
        Ok(self.blobs.remove(key).is_some())
    }
}
