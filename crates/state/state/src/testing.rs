use std::sync::Arc;

use crate::error::StateError;
use crate::key::{KeyKind, StateKey};
use crate::store::{CasResult, StateStore};

fn test_key(kind: KeyKind, id: &str) -> StateKey {
    StateKey::new(kind, id)
}

/// Run the full state store conformance test suite.
///
/// Call this from your backend's test module with a fresh store instance.
///
/// # Errors
///
/// Returns an error if any conformance test fails.
pub async fn run_store_conformance_tests(store: &dyn StateStore) -> Result<(), StateError> {
    test_get_missing(store).await?;
    test_check_and_set_new(store).await?;
    test_check_and_set_existing(store).await?;
    test_versioned_read(store).await?;
    test_delete(store).await?;
    test_compare_and_swap(store).await?;
    test_compare_and_swap_missing(store).await?;
    test_scan_keys(store).await?;
    test_expiry_index(store).await?;
    Ok(())
}

/// Race many compare-and-swap attempts against the same version and check
/// that exactly one wins.
///
/// # Errors
///
/// Returns an error if a store operation fails.
pub async fn run_concurrent_cas_test(store: Arc<dyn StateStore>) -> Result<(), StateError> {
    let key = test_key(KeyKind::DownloadToken, "race");
    assert!(store.check_and_set(&key, "fresh").await?);

    let mut handles = Vec::new();
    for i in 0..32 {
        let store = Arc::clone(&store);
        let key = key.clone();
        handles.push(tokio::spawn(async move {
            store
                .compare_and_swap(&key, 1, &format!("winner-{i}"))
                .await
        }));
    }

    let mut wins = 0;
    for handle in handles {
        let result = handle
            .await
            .map_err(|e| StateError::Backend(e.to_string()))??;
        if result == CasResult::Ok {
            wins += 1;
        }
    }
    assert_eq!(wins, 1, "exactly one concurrent CAS should win");

    let stored = store.get_versioned(&key).await?.expect("key should exist");
    assert_eq!(stored.version, 2);
    assert!(stored.value.starts_with("winner-"));
    Ok(())
}

async fn test_get_missing(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::Document, "missing");
    let val = store.get(&key).await?;
    assert!(val.is_none(), "get on missing key should return None");
    assert!(store.get_versioned(&key).await?.is_none());
    Ok(())
}

async fn test_check_and_set_new(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::Document, "cas-new");
    let created = store.check_and_set(&key, "v1").await?;
    assert!(created, "check_and_set on new key should return true");
    let val = store.get(&key).await?;
    assert_eq!(val.as_deref(), Some("v1"));
    Ok(())
}

async fn test_check_and_set_existing(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::Document, "cas-existing");
    store.check_and_set(&key, "v1").await?;
    let created = store.check_and_set(&key, "v2").await?;
    assert!(
        !created,
        "check_and_set on existing key should return false"
    );
    let val = store.get(&key).await?;
    assert_eq!(val.as_deref(), Some("v1"), "original value should remain");
    Ok(())
}

async fn test_versioned_read(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::DownloadToken, "versioned");
    store.check_and_set(&key, "v1").await?;
    let read = store.get_versioned(&key).await?.expect("key should exist");
    assert_eq!(read.value, "v1");
    assert_eq!(read.version, 1, "newly created keys start at version 1");
    Ok(())
}

async fn test_delete(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::DownloadToken, "to-delete");
    store.check_and_set(&key, "bye").await?;
    let existed = store.delete(&key).await?;
    assert!(existed, "delete should return true for existing key");
    let val = store.get(&key).await?;
    assert!(val.is_none(), "get after delete should return None");

    let existed = store.delete(&key).await?;
    assert!(!existed, "delete on missing key should return false");
    Ok(())
}

async fn test_compare_and_swap(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::DownloadToken, "cas-version");
    store.check_and_set(&key, "initial").await?;

    // CAS with wrong version should fail
    let result = store.compare_and_swap(&key, 999, "updated").await?;
    assert_eq!(
        result,
        CasResult::Conflict {
            current_value: Some("initial".into()),
            current_version: 1,
        },
        "CAS with wrong version should conflict"
    );

    // CAS with correct version should succeed
    let result = store.compare_and_swap(&key, 1, "updated").await?;
    assert_eq!(
        result,
        CasResult::Ok,
        "CAS with correct version should succeed"
    );

    // The old version is now stale
    let result = store.compare_and_swap(&key, 1, "again").await?;
    assert!(matches!(result, CasResult::Conflict { current_version: 2, .. }));

    let val = store.get(&key).await?;
    assert_eq!(val.as_deref(), Some("updated"));
    Ok(())
}

async fn test_compare_and_swap_missing(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::DownloadToken, "cas-missing");
    let result = store.compare_and_swap(&key, 1, "value").await?;
    assert_eq!(
        result,
        CasResult::Conflict {
            current_value: None,
            current_version: 0,
        }
    );
    assert!(store.get(&key).await?.is_none(), "CAS must not create keys");
    Ok(())
}

async fn test_scan_keys(store: &dyn StateStore) -> Result<(), StateError> {
    let alice_1 = StateKey::compound(KeyKind::OwnerIndex, &["alice", "doc-1"]);
    let alice_2 = StateKey::compound(KeyKind::OwnerIndex, &["alice", "doc-2"]);
    let alicia = StateKey::compound(KeyKind::OwnerIndex, &["alicia", "doc-3"]);
    let other_kind = StateKey::compound(KeyKind::ContextIndex, &["alice", "doc-4"]);
    store.check_and_set(&alice_1, "doc-1").await?;
    store.check_and_set(&alice_2, "doc-2").await?;
    store.check_and_set(&alicia, "doc-3").await?;
    store.check_and_set(&other_kind, "doc-4").await?;

    let prefix = StateKey::compound_prefix(&["alice"]);
    let mut found = store
        .scan_keys(KeyKind::OwnerIndex, Some(&prefix))
        .await?;
    found.sort();
    assert_eq!(
        found,
        vec![
            (alice_1.id.clone(), "doc-1".to_owned()),
            (alice_2.id.clone(), "doc-2".to_owned()),
        ]
    );

    let all = store.scan_keys(KeyKind::OwnerIndex, None).await?;
    assert_eq!(all.len(), 3, "unfiltered scan is limited to the kind");
    Ok(())
}

async fn test_expiry_index(store: &dyn StateStore) -> Result<(), StateError> {
    let early = test_key(KeyKind::DownloadToken, "expiry-early");
    let late = test_key(KeyKind::DownloadToken, "expiry-late");
    let other = test_key(KeyKind::Custom("other".into()), "expiry-other");

    store.index_expiry(&early, 1_000).await?;
    store.index_expiry(&late, 5_000).await?;
    store.index_expiry(&other, 1_000).await?;

    let expired = store.get_expired(KeyKind::DownloadToken, 2_000).await?;
    assert_eq!(expired, vec![early.clone()]);

    // Boundary is inclusive.
    let mut expired = store.get_expired(KeyKind::DownloadToken, 5_000).await?;
    expired.sort_by(|a, b| a.id.cmp(&b.id));
    assert_eq!(expired, vec![early.clone(), late.clone()]);

    store.remove_expiry_index(&early).await?;
    let expired = store.get_expired(KeyKind::DownloadToken, 10_000).await?;
    assert_eq!(expired, vec![late.clone()]);

    // Re-indexing moves the deadline.
    store.index_expiry(&late, 20_000).await?;
    let expired = store.get_expired(KeyKind::DownloadToken, 10_000).await?;
    assert!(expired.is_empty());
    Ok(())
}
