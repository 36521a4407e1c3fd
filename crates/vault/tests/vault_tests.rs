use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Duration, Utc};

use medidoc_blob::{BlobError, BlobStore};
use medidoc_blob_memory::MemoryBlobStore;
use medidoc_core::{
    AccessContext, ActorId, ActorRole, ContextKind, DocumentId, ManualClock, MappingKind,
    OwnerContext, StorageKey,
};
use medidoc_state::{KeyKind, StateStore};
use medidoc_state_memory::MemoryStateStore;
use medidoc_vault::{
    RelationshipError, RelationshipResolver, StaticRelationships, Upload, Vault, VaultBuilder,
    VaultError,
};

struct Harness {
    vault: Arc<Vault>,
    clock: Arc<ManualClock>,
    blobs: Arc<MemoryBlobStore>,
    state: Arc<MemoryStateStore>,
}

fn harness(relationships: StaticRelationships) -> Harness {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let blobs = Arc::new(MemoryBlobStore::new());
    let state = Arc::new(MemoryStateStore::new());
    let vault = VaultBuilder::new()
        .state(state.clone())
        .blobs(blobs.clone())
        .relationships(Arc::new(relationships))
        .clock(clock.clone())
        .max_upload_bytes(1024)
        .base_url("https://vault.test")
        .build()
        .unwrap();
    Harness {
        vault: Arc::new(vault),
        clock,
        blobs,
        state,
    }
}

fn upload(name: &str, data: &'static [u8], context: Option<OwnerContext>) -> Upload {
    Upload {
        file_name: name.into(),
        content_type: None,
        owner_context: context,
        remark: None,
        data: Bytes::from_static(data),
    }
}

fn admin() -> AccessContext {
    AccessContext::new("admin-1", ActorRole::Administrator)
}

fn doctor(id: &str) -> AccessContext {
    AccessContext::new(id, ActorRole::Doctor)
}

fn patient(id: &str) -> AccessContext {
    AccessContext::new(id, ActorRole::Patient)
}

fn case_history(patient: &str) -> OwnerContext {
    OwnerContext::new(ContextKind::CaseHistory)
        .with_ref_id("ch-1")
        .with_patient(patient)
}

#[tokio::test]
async fn administrator_upload_readable_by_mapped_doctor_only() {
    let h = harness(StaticRelationships::new().with_mapping(MappingKind::Doctor, "d-1", "p-1"));

    let doc = h
        .vault
        .upload(
            &admin(),
            upload("notes.txt", b"0123456789", Some(case_history("p-1"))),
        )
        .await
        .unwrap();
    assert_eq!(doc.size_bytes, 10);
    assert_eq!(doc.content_type, "text/plain");
    assert_eq!(doc.uploaded_by_role, ActorRole::Administrator);

    let fetched = h
        .vault
        .fetch_authenticated(&doctor("d-1"), &doc.id)
        .await
        .unwrap();
    assert_eq!(&fetched.data[..], b"0123456789");

    let denied = h.vault.fetch_authenticated(&doctor("d-2"), &doc.id).await;
    assert!(matches!(denied, Err(VaultError::Forbidden)));
    assert_eq!(h.vault.metrics().access_denied, 1);
}

#[tokio::test]
async fn patient_token_is_single_use() {
    let h = harness(StaticRelationships::new());
    let owner = patient("p-1");
    let doc = h
        .vault
        .upload(&owner, upload("lab.pdf", b"%PDF-1.7", None))
        .await
        .unwrap();

    let issued = h
        .vault
        .issue_download_token(&owner, &doc.id, Some(Duration::seconds(60)))
        .await
        .unwrap();
    assert!(issued.download_url.starts_with("https://vault.test/v1/download/"));
    assert_eq!(issued.ttl_seconds(), 60);

    let first = h.vault.fetch_by_token(&issued.token_value).await.unwrap();
    assert_eq!(&first.data[..], b"%PDF-1.7");
    assert_eq!(first.content_type(), "application/pdf");
    assert_eq!(
        first.content_disposition(),
        "attachment; filename=\"lab.pdf\"; filename*=UTF-8''lab.pdf"
    );

    let second = h.vault.fetch_by_token(&issued.token_value).await;
    assert!(matches!(second, Err(VaultError::AlreadyUsed)));
    assert!(second.unwrap_err().is_redemption_failure());
}

#[tokio::test]
async fn token_expires_after_ttl() {
    let h = harness(StaticRelationships::new());
    let owner = patient("p-1");
    let doc = h
        .vault
        .upload(&owner, upload("a.txt", b"abc", None))
        .await
        .unwrap();
    let issued = h
        .vault
        .issue_download_token(&owner, &doc.id, Some(Duration::seconds(1)))
        .await
        .unwrap();

    h.clock.advance(Duration::seconds(2));

    let result = h.vault.fetch_by_token(&issued.token_value).await;
    assert!(matches!(result, Err(VaultError::Expired)));
    assert_eq!(h.vault.metrics().redemptions_rejected, 1);
}

#[tokio::test]
async fn token_redemption_matches_authenticated_fetch() {
    let h = harness(StaticRelationships::new());
    let owner = doctor("d-1");
    let doc = h
        .vault
        .upload(&owner, upload("x-ray.png", b"\x89PNG....", None))
        .await
        .unwrap();

    let direct = h.vault.fetch_authenticated(&owner, &doc.id).await.unwrap();
    let issued = h
        .vault
        .issue_download_token(&owner, &doc.id, None)
        .await
        .unwrap();
    let via_token = h.vault.fetch_by_token(&issued.token_value).await.unwrap();

    assert_eq!(direct.data, via_token.data);
    assert_eq!(direct.document, via_token.document);
    assert_eq!(direct.content_disposition(), via_token.content_disposition());
}

#[tokio::test]
async fn denied_actor_cannot_get_a_token() {
    let h = harness(StaticRelationships::new());
    let doc = h
        .vault
        .upload(&patient("p-1"), upload("a.txt", b"abc", None))
        .await
        .unwrap();

    let result = h
        .vault
        .issue_download_token(&doctor("d-1"), &doc.id, None)
        .await;
    assert!(matches!(result, Err(VaultError::Forbidden)));
    assert_eq!(h.vault.metrics().tokens_issued, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn fifty_concurrent_redemptions_deliver_once() {
    let h = harness(StaticRelationships::new());
    let owner = patient("p-1");
    let doc = h
        .vault
        .upload(&owner, upload("a.txt", b"secret", None))
        .await
        .unwrap();
    let issued = h
        .vault
        .issue_download_token(&owner, &doc.id, None)
        .await
        .unwrap();

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let vault = Arc::clone(&h.vault);
            let value = issued.token_value.clone();
            tokio::spawn(async move { vault.fetch_by_token(&value).await })
        })
        .collect();

    let mut delivered = Vec::new();
    let mut rejected = 0;
    for result in futures::future::join_all(handles).await {
        match result.unwrap() {
            Ok(retrieved) => delivered.push(retrieved.data),
            Err(VaultError::AlreadyUsed) => rejected += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(delivered.len(), 1);
    assert_eq!(&delivered[0][..], b"secret");
    assert_eq!(rejected, 49);

    let snapshot = h.vault.metrics();
    assert_eq!(snapshot.tokens_redeemed, 1);
    assert_eq!(snapshot.redemptions_rejected, 49);
}

#[tokio::test]
async fn validation_failures_store_nothing() {
    let h = harness(StaticRelationships::new());
    let owner = patient("p-1");

    let too_big: &'static [u8] = &[0u8; 2048];
    let result = h.vault.upload(&owner, upload("big.bin", too_big, None)).await;
    assert!(matches!(result, Err(VaultError::TooLarge { .. })));

    let mut no_type = upload("a.txt", b"abc", None);
    no_type.content_type = Some(String::new());
    let result = h.vault.upload(&owner, no_type).await;
    assert!(matches!(result, Err(VaultError::Validation(_))));

    assert!(h.blobs.is_empty());
    assert!(h.state.is_empty());
}

#[tokio::test]
async fn unknown_extension_falls_back_to_octet_stream() {
    let h = harness(StaticRelationships::new());
    let doc = h
        .vault
        .upload(&patient("p-1"), upload("blob", b"??", None))
        .await
        .unwrap();
    assert_eq!(doc.content_type, "application/octet-stream");
}

#[tokio::test]
async fn missing_blob_is_an_integrity_error() {
    let h = harness(StaticRelationships::new());
    let owner = patient("p-1");
    let doc = h
        .vault
        .upload(&owner, upload("a.txt", b"abc", None))
        .await
        .unwrap();
    h.blobs.delete(&doc.storage_key).await.unwrap();

    let result = h.vault.fetch_authenticated(&owner, &doc.id).await;
    assert!(matches!(result, Err(VaultError::Integrity(_))));
}

#[tokio::test]
async fn unknown_document_is_not_found() {
    let h = harness(StaticRelationships::new());
    let result = h
        .vault
        .fetch_authenticated(&admin(), &DocumentId::new("missing"))
        .await;
    assert!(matches!(result, Err(VaultError::NotFound(_))));
}

#[tokio::test]
async fn listings_only_return_readable_documents() {
    let h = harness(StaticRelationships::new().with_mapping(MappingKind::Doctor, "d-1", "p-1"));

    let visible = h
        .vault
        .upload(
            &doctor("d-9"),
            upload("ch.txt", b"1", Some(case_history("p-1"))),
        )
        .await
        .unwrap();
    h.vault
        .upload(
            &doctor("d-9"),
            upload("ch2.txt", b"2", Some(case_history("p-2"))),
        )
        .await
        .unwrap();

    let by_owner = h
        .vault
        .list_by_owner(&doctor("d-1"), &ActorId::new("d-9"))
        .await
        .unwrap();
    assert_eq!(by_owner, vec![visible.clone()]);

    let by_context = h
        .vault
        .list_by_context(&doctor("d-1"), ContextKind::CaseHistory, "ch-1")
        .await
        .unwrap();
    assert_eq!(by_context, vec![visible]);

    let all = h
        .vault
        .list_by_context(&admin(), ContextKind::CaseHistory, "ch-1")
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn storage_stats_are_admin_only() {
    let h = harness(StaticRelationships::new());
    h.vault
        .upload(&patient("p-1"), upload("a.txt", b"abcd", None))
        .await
        .unwrap();

    let stats = h.vault.storage_stats(&admin()).await.unwrap();
    assert_eq!(stats.documents, 1);
    assert_eq!(stats.total_bytes, 4);

    assert!(matches!(
        h.vault.storage_stats(&patient("p-1")).await,
        Err(VaultError::Forbidden)
    ));
}

#[tokio::test]
async fn tokens_are_listed_by_digest_only() {
    let h = harness(StaticRelationships::new());
    let owner = patient("p-1");
    let doc = h
        .vault
        .upload(&owner, upload("a.txt", b"abc", None))
        .await
        .unwrap();
    let issued = h
        .vault
        .issue_download_token(&owner, &doc.id, None)
        .await
        .unwrap();

    let tokens = h.vault.tokens_for_document(&owner, &doc.id).await.unwrap();
    assert_eq!(tokens.len(), 1);
    assert_ne!(tokens[0].token_digest, issued.token_value);

    let index = h
        .state
        .scan_keys(KeyKind::TokenDocumentIndex, None)
        .await
        .unwrap();
    assert!(index.iter().all(|(id, v)| !id.contains(&issued.token_value) && v != &issued.token_value));

    assert!(matches!(
        h.vault.tokens_for_document(&patient("p-2"), &doc.id).await,
        Err(VaultError::Forbidden)
    ));
}

/// Answers only after a long delay.
struct Stalled;

#[async_trait]
impl RelationshipResolver for Stalled {
    async fn is_mapped(
        &self,
        _kind: MappingKind,
        _actor_id: &ActorId,
        _patient_id: &ActorId,
    ) -> Result<bool, RelationshipError> {
        tokio::time::sleep(StdDuration::from_secs(30)).await;
        Ok(true)
    }
}

#[tokio::test(start_paused = true)]
async fn relationship_timeout_fails_closed() {
    let vault = VaultBuilder::new()
        .state(Arc::new(MemoryStateStore::new()))
        .blobs(Arc::new(MemoryBlobStore::new()))
        .relationships(Arc::new(Stalled))
        .relationship_timeout(StdDuration::from_millis(100))
        .build()
        .unwrap();

    let doc = vault
        .upload(&admin(), upload("a.txt", b"abc", Some(case_history("p-1"))))
        .await
        .unwrap();
    let result = vault.fetch_authenticated(&doctor("d-1"), &doc.id).await;
    assert!(matches!(result, Err(VaultError::Forbidden)));
}

/// State store whose writes always fail.
struct FailingState;

#[async_trait]
impl StateStore for FailingState {
    async fn check_and_set(
        &self,
        _key: &medidoc_state::StateKey,
        _value: &str,
    ) -> Result<bool, medidoc_state::StateError> {
        Err(medidoc_state::StateError::Connection("database down".into()))
    }

    async fn get_versioned(
        &self,
        _key: &medidoc_state::StateKey,
    ) -> Result<Option<medidoc_state::Versioned>, medidoc_state::StateError> {
        Ok(None)
    }

    async fn compare_and_swap(
        &self,
        _key: &medidoc_state::StateKey,
        _expected_version: u64,
        _new_value: &str,
    ) -> Result<medidoc_state::CasResult, medidoc_state::StateError> {
        Err(medidoc_state::StateError::Connection("database down".into()))
    }

    async fn delete(&self, _key: &medidoc_state::StateKey) -> Result<bool, medidoc_state::StateError> {
        Ok(false)
    }

    async fn scan_keys(
        &self,
        _kind: KeyKind,
        _prefix: Option<&str>,
    ) -> Result<Vec<(String, String)>, medidoc_state::StateError> {
        Ok(Vec::new())
    }

    async fn index_expiry(
        &self,
        _key: &medidoc_state::StateKey,
        _expires_at_ms: i64,
    ) -> Result<(), medidoc_state::StateError> {
        Ok(())
    }

    async fn remove_expiry_index(
        &self,
        _key: &medidoc_state::StateKey,
    ) -> Result<(), medidoc_state::StateError> {
        Ok(())
    }

    async fn get_expired(
        &self,
        _kind: KeyKind,
        _now_ms: i64,
    ) -> Result<Vec<medidoc_state::StateKey>, medidoc_state::StateError> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn catalog_failure_removes_orphan_blob() {
    let blobs = Arc::new(MemoryBlobStore::new());
    let vault = VaultBuilder::new()
        .state(Arc::new(FailingState))
        .blobs(blobs.clone())
        .build()
        .unwrap();

    let result = vault
        .upload(&patient("p-1"), upload("a.txt", b"abc", None))
        .await;
    assert!(matches!(result, Err(VaultError::State(_))));
    assert!(blobs.is_empty(), "blob written for a failed upload is removed");
}

/// Blob store that is always unreachable.
struct Offline;

#[async_trait]
impl BlobStore for Offline {
    async fn put(&self, _data: Bytes) -> Result<StorageKey, BlobError> {
        Err(BlobError::Unavailable("connection reset".into()))
    }

    async fn get(&self, _key: &StorageKey) -> Result<Option<Bytes>, BlobError> {
        Err(BlobError::Unavailable("connection reset".into()))
    }

    async fn delete(&self, _key: &StorageKey) -> Result<bool, BlobError> {
        Err(BlobError::Unavailable("connection reset".into()))
    }
}

#[tokio::test]
async fn unavailable_blob_store_surfaces_as_storage_unavailable() {
    let state = Arc::new(MemoryStateStore::new());
    let vault = VaultBuilder::new()
        .state(state.clone())
        .blobs(Arc::new(Offline))
        .build()
        .unwrap();

    let result = vault
        .upload(&patient("p-1"), upload("a.txt", b"abc", None))
        .await;
    assert!(matches!(result, Err(VaultError::StorageUnavailable(_))));
    assert!(state.is_empty());
}
