use async_trait::async_trait;
use bytes::Bytes;

use medidoc_core::StorageKey;

use crate::error::BlobError;

/// Durable key to bytes storage.
///
/// Implementations know nothing about documents, actors or permissions.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data` under a freshly assigned key.
    ///
    /// The write must be durable before this returns `Ok`, so that a record
    /// referencing the key can never dangle.
    async fn put(&self, data: Bytes) -> Result<StorageKey, BlobError>;

    /// Retrieve the bytes stored under `key`.
    ///
    /// Returns `None` if the key never existed or was removed out of band.
    async fn get(&self, key: &StorageKey) -> Result<Option<Bytes>, BlobError>;

    /// Delete a blob. Returns `true` if the blob existed.
    async fn delete(&self, key: &StorageKey) -> Result<bool, BlobError>;
}
