use bytes::Bytes;

use medidoc_core::StorageKey;

use crate::error::BlobError;
use crate::store::BlobStore;

/// Run the blob store conformance test suite against a fresh store.
///
/// # Errors
///
/// Returns an error if a store operation fails.
pub async fn run_blob_conformance_tests(store: &dyn BlobStore) -> Result<(), BlobError> {
    test_put_and_get(store).await?;
    test_get_missing(store).await?;
    test_keys_are_unique(store).await?;
    test_empty_blob(store).await?;
    test_delete(store).await?;
    Ok(())
}

async fn test_put_and_get(store: &dyn BlobStore) -> Result<(), BlobError> {
    let data = Bytes::from_static(b"patient scan bytes");
    let key = store.put(data.clone()).await?;
    let read = store.get(&key).await?;
    assert_eq!(read, Some(data), "get should return the bytes that were put");
    Ok(())
}

async fn test_get_missing(store: &dyn BlobStore) -> Result<(), BlobError> {
    let read = store.get(&StorageKey::new("never-written")).await?;
    assert!(read.is_none(), "get on missing key should return None");
    Ok(())
}

async fn test_keys_are_unique(store: &dyn BlobStore) -> Result<(), BlobError> {
    let a = store.put(Bytes::from_static(b"same")).await?;
    let b = store.put(Bytes::from_static(b"same")).await?;
    assert_ne!(a, b, "identical content must still get distinct keys");
    Ok(())
}

async fn test_empty_blob(store: &dyn BlobStore) -> Result<(), BlobError> {
    let key = store.put(Bytes::new()).await?;
    let read = store.get(&key).await?;
    assert_eq!(read.map(|b| b.len()), Some(0));
    Ok(())
}

async fn test_delete(store: &dyn BlobStore) -> Result<(), BlobError> {
    let key = store.put(Bytes::from_static(b"to delete")).await?;
    assert!(store.delete(&key).await?, "delete should report existing blob");
    assert!(store.get(&key).await?.is_none());
    assert!(!store.delete(&key).await?, "second delete should be a no-op");
    Ok(())
}
