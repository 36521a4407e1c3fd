use std::sync::Arc;

use medidoc_blob::{BlobStore, RetryingBlobStore};
use medidoc_blob_fs::FsBlobStore;
use medidoc_blob_memory::MemoryBlobStore;

use crate::config::BlobConfig;
use crate::error::ServerError;

/// Construct a `BlobStore` from configuration, wrapped with retry on
/// transient failures.
pub async fn create_blob_store(config: &BlobConfig) -> Result<Arc<dyn BlobStore>, ServerError> {
    let inner: Arc<dyn BlobStore> = match config.backend.as_str() {
        "memory" => Arc::new(MemoryBlobStore::new()),
        "filesystem" | "fs" => {
            let root = config.root.as_deref().ok_or_else(|| {
                ServerError::Config("filesystem blob backend requires 'root' in [blob]".into())
            })?;
            let store = FsBlobStore::open(root)
                .await
                .map_err(|e| ServerError::Config(format!("filesystem blob store: {e}")))?;
            Arc::new(store)
        }
        other => {
            return Err(ServerError::Config(format!(
                "unsupported blob backend: {other}"
            )));
        }
    };
    Ok(Arc::new(RetryingBlobStore::new(inner, config.retry_policy())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn filesystem_requires_root() {
        let config = BlobConfig {
            backend: "filesystem".into(),
            ..BlobConfig::default()
        };
        assert!(matches!(
            create_blob_store(&config).await,
            Err(ServerError::Config(_))
        ));
    }

    #[tokio::test]
    async fn memory_store_round_trips() {
        let store = create_blob_store(&BlobConfig::default()).await.unwrap();
        let key = store.put(bytes::Bytes::from_static(b"hello")).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap().unwrap().as_ref(), b"hello");
    }

    #[tokio::test]
    async fn unknown_backend_is_rejected() {
        let config = BlobConfig {
            backend: "s3".into(),
            ..BlobConfig::default()
        };
        assert!(create_blob_store(&config).await.is_err());
    }
}
