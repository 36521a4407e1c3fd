use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use medidoc_core::{
    ActorId, ActorRole, ContextKind, Document, DocumentId, OwnerContext, StorageKey,
};
use medidoc_state::{KeyKind, StateKey, StateStore};

use crate::error::VaultError;

/// Metadata for a document about to be recorded.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub owner_actor_id: ActorId,
    pub uploaded_by_role: ActorRole,
    pub owner_context: Option<OwnerContext>,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub storage_key: StorageKey,
    pub remark: Option<String>,
}

/// Totals across every document in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CatalogStats {
    pub documents: u64,
    pub total_bytes: u64,
}

/// Immutable document metadata records with owner and context indexes.
///
/// Index entries are written before the record itself, and readers resolve
/// every index hit through the record. A document is therefore visible only
/// once its record exists, and an interrupted `create` leaves at most an
/// index entry that points nowhere.
pub struct DocumentCatalog {
    state: Arc<dyn StateStore>,
    max_size_bytes: u64,
}

impl DocumentCatalog {
    pub fn new(state: Arc<dyn StateStore>, max_size_bytes: u64) -> Self {
        Self {
            state,
            max_size_bytes,
        }
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }

    /// Check upload metadata without writing anything.
    pub fn validate(
        &self,
        file_name: &str,
        content_type: &str,
        size_bytes: u64,
    ) -> Result<(), VaultError> {
        if size_bytes > self.max_size_bytes {
            return Err(VaultError::TooLarge {
                size: size_bytes,
                limit: self.max_size_bytes,
            });
        }
        if file_name.trim().is_empty() {
            return Err(VaultError::Validation("file name must not be empty".into()));
        }
        if file_name.chars().any(char::is_control) {
            return Err(VaultError::Validation(
                "file name must not contain control characters".into(),
            ));
        }
        if content_type.trim().is_empty() {
            return Err(VaultError::Validation(
                "content type must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Record a new document and assign it a fresh id.
    pub async fn create(
        &self,
        new: NewDocument,
        created_at: DateTime<Utc>,
    ) -> Result<Document, VaultError> {
        self.validate(&new.file_name, &new.content_type, new.size_bytes)?;

        let document = Document {
            id: DocumentId::generate(),
            owner_actor_id: new.owner_actor_id,
            uploaded_by_role: new.uploaded_by_role,
            owner_context: new.owner_context,
            file_name: new.file_name,
            content_type: new.content_type,
            size_bytes: new.size_bytes,
            remark: new.remark,
            storage_key: new.storage_key,
            created_at,
        };

        let doc_id = document.id.as_str();
        let owner_key = StateKey::compound(
            KeyKind::OwnerIndex,
            &[document.owner_actor_id.as_str(), doc_id],
        );
        self.state.check_and_set(&owner_key, doc_id).await?;

        if let Some(ctx) = &document.owner_context
            && let Some(ref_id) = &ctx.ref_id
        {
            let context_key =
                StateKey::compound(KeyKind::ContextIndex, &[ctx.kind.as_str(), ref_id.as_str(), doc_id]);
            self.state.check_and_set(&context_key, doc_id).await?;
        }

        let record = serde_json::to_string(&document)?;
        let created = self
            .state
            .check_and_set(&StateKey::new(KeyKind::Document, doc_id), &record)
            .await?;
        if !created {
            return Err(VaultError::Validation(format!(
                "document id {doc_id} already exists"
            )));
        }

        debug!(document.id = %document.id, size = document.size_bytes, "document recorded");
        Ok(document)
    }

    /// Fetch a document by id.
    pub async fn get(&self, id: &DocumentId) -> Result<Document, VaultError> {
        self.find(id)
            .await?
            .ok_or_else(|| VaultError::NotFound(format!("document {id}")))
    }

    async fn find(&self, id: &DocumentId) -> Result<Option<Document>, VaultError> {
        let key = StateKey::new(KeyKind::Document, id.as_str());
        match self.state.get(&key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Documents uploaded by `owner`, oldest first.
    pub async fn list_by_owner(&self, owner: &ActorId) -> Result<Vec<Document>, VaultError> {
        let prefix = StateKey::compound_prefix(&[owner.as_str()]);
        self.resolve_index(KeyKind::OwnerIndex, &prefix).await
    }

    /// Documents attached to the record `(kind, ref_id)`, oldest first.
    pub async fn list_by_context(
        &self,
        kind: ContextKind,
        ref_id: &str,
    ) -> Result<Vec<Document>, VaultError> {
        let prefix = StateKey::compound_prefix(&[kind.as_str(), ref_id]);
        self.resolve_index(KeyKind::ContextIndex, &prefix).await
    }

    async fn resolve_index(
        &self,
        kind: KeyKind,
        prefix: &str,
    ) -> Result<Vec<Document>, VaultError> {
        let entries = self.state.scan_keys(kind, Some(prefix)).await?;
        let mut documents = Vec::with_capacity(entries.len());
        for (index_id, doc_id) in entries {
            match self.find(&DocumentId::new(doc_id)).await? {
                Some(doc) => documents.push(doc),
                None => warn!(index = %index_id, "index entry without document record"),
            }
        }
        documents.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(documents)
    }

    /// Document count and total stored bytes.
    pub async fn stats(&self) -> Result<CatalogStats, VaultError> {
        let records = self.state.scan_keys(KeyKind::Document, None).await?;
        let mut stats = CatalogStats::default();
        for (_, raw) in records {
            let doc: Document = serde_json::from_str(&raw)?;
            stats.documents += 1;
            stats.total_bytes += doc.size_bytes;
        }
        Ok(stats)
    }
}
