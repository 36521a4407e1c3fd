use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;

use medidoc_blob::{BlobError, BlobStore};
use medidoc_core::StorageKey;

const TMP_DIR: &str = ".tmp";

/// Filesystem-backed [`BlobStore`].
///
/// Blobs are written to a temporary file, flushed with `fsync`, then renamed
/// into `<root>/<shard>/<key>` and the shard directory is synced. A blob is
/// therefore either fully present or absent after a crash.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, BlobError> {
        let root = root.into();
        tokio::fs::create_dir_all(root.join(TMP_DIR))
            .await
            .map_err(|e| map_io(&e))?;
        tracing::info!(root = %root.display(), "filesystem blob store ready");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve the final path for a key, or `None` if the key could not have
    /// been produced by this store.
    fn blob_path(&self, key: &StorageKey) -> Option<PathBuf> {
        let key = key.as_str();
        let valid = key.len() >= 2
            && key
                .chars()
                .all(|c| c.is_ascii_hexdigit() || c == '-');
        if !valid {
            return None;
        }
        let shard = &key[key.len() - 2..];
        Some(self.root.join(shard).join(key))
    }
}

/// Map an I/O error into the blob error taxonomy.
fn map_io(e: &io::Error) -> BlobError {
    match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock => {
            BlobError::Unavailable(e.to_string())
        }
        _ => BlobError::Storage(e.to_string()),
    }
}

async fn sync_dir(dir: &Path) -> io::Result<()> {
    tokio::fs::File::open(dir).await?.sync_all().await
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, data: Bytes) -> Result<StorageKey, BlobError> {
        let key = StorageKey::generate();
        let Some(target) = self.blob_path(&key) else {
            return Err(BlobError::Storage(format!("generated invalid key {key}")));
        };
        let tmp = self.root.join(TMP_DIR).join(format!("{key}.part"));

        let write = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
            drop(file);

            if let Some(shard) = target.parent() {
                tokio::fs::create_dir_all(shard).await?;
                tokio::fs::rename(&tmp, &target).await?;
                sync_dir(shard).await?;
            }
            io::Result::Ok(())
        };

        if let Err(e) = write.await {
            let _ = tokio::fs::remove_file(&tmp).await;
            tracing::error!(key = %key, error = %e, "blob write failed");
            return Err(map_io(&e));
        }

        tracing::debug!(key = %key, size = data.len(), "blob stored");
        Ok(key)
    }

    async fn get(&self, key: &StorageKey) -> Result<Option<Bytes>, BlobError> {
        let Some(path) = self.blob_path(key) else {
            return Ok(None);
        };
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(map_io(&e)),
        }
    }

    async fn delete(&self, key: &StorageKey) -> Result<bool, BlobError> {
        let Some(path) = self.blob_path(key) else {
            return Ok(false);
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(map_io(&e)),
        }
    }
}
