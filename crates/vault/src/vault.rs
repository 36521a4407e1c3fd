use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use bytes::Bytes;
use chrono::Duration;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tracing::{info, instrument, warn};

use medidoc_blob::BlobStore;
use medidoc_core::{
    AccessContext, ActorId, ContextKind, Clock, Document, DocumentId, DownloadToken, IssuedToken,
    OwnerContext,
};

use crate::catalog::{CatalogStats, DocumentCatalog, NewDocument};
use crate::error::VaultError;
use crate::metrics::{MetricsSnapshot, VaultMetrics};
use crate::policy;
use crate::relationship::{self, RelationshipResolver};
use crate::tokens::{TokenManager, token_fingerprint};

/// Used when a file name gives no hint about its type.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Characters left unescaped in an RFC 5987 `filename*` value.
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

/// A file being uploaded.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    /// Inferred from `file_name` when absent.
    pub content_type: Option<String>,
    pub owner_context: Option<OwnerContext>,
    pub remark: Option<String>,
    pub data: Bytes,
}

/// Document bytes plus the metadata needed to serve them.
#[derive(Debug, Clone)]
pub struct Retrieved {
    pub document: Document,
    pub data: Bytes,
}

impl Retrieved {
    pub fn content_type(&self) -> &str {
        &self.document.content_type
    }

    /// `Content-Disposition` value that makes browsers save the file under
    /// its original name.
    pub fn content_disposition(&self) -> String {
        content_disposition(&self.document.file_name)
    }
}

/// Build an `attachment` disposition with an ASCII fallback name and a
/// UTF-8 `filename*` parameter.
pub fn content_disposition(file_name: &str) -> String {
    let fallback: String = file_name
        .chars()
        .map(|c| {
            if c.is_ascii() && !c.is_ascii_control() && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let encoded = utf8_percent_encode(file_name, ATTR_CHAR);
    format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}

/// Guess a content type from a file name.
pub fn infer_content_type(file_name: &str) -> String {
    mime_guess::from_path(file_name)
        .first_raw()
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_owned()
}

/// Entry point for every document operation.
///
/// Composes the catalog, blob store, access policy and token manager. Every
/// authenticated operation takes an explicit [`AccessContext`]; relationship
/// facts are resolved here, under a deadline, before the policy runs.
pub struct Vault {
    pub(crate) catalog: DocumentCatalog,
    pub(crate) tokens: TokenManager,
    pub(crate) blobs: Arc<dyn BlobStore>,
    pub(crate) relationships: Arc<dyn RelationshipResolver>,
    pub(crate) relationship_timeout: StdDuration,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) metrics: Arc<VaultMetrics>,
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("relationship_timeout", &self.relationship_timeout)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

impl Vault {
    pub fn catalog(&self) -> &DocumentCatalog {
        &self.catalog
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Store a new document owned by the calling actor.
    #[instrument(skip(self, ctx, upload), fields(actor.id = %ctx.actor_id, file_name = %upload.file_name))]
    pub async fn upload(&self, ctx: &AccessContext, upload: Upload) -> Result<Document, VaultError> {
        if !policy::can_write(ctx, upload.owner_context.as_ref()) {
            self.metrics.increment_access_denied();
            return Err(VaultError::Forbidden);
        }

        let content_type = upload
            .content_type
            .unwrap_or_else(|| infer_content_type(&upload.file_name));
        let size_bytes = upload.data.len() as u64;
        self.catalog
            .validate(&upload.file_name, &content_type, size_bytes)?;

        let storage_key = self.blobs.put(upload.data).await?;
        let new = NewDocument {
            owner_actor_id: ctx.actor_id.clone(),
            uploaded_by_role: ctx.role,
            owner_context: upload.owner_context,
            file_name: upload.file_name,
            content_type,
            size_bytes,
            storage_key: storage_key.clone(),
            remark: upload.remark,
        };

        match self.catalog.create(new, self.clock.now()).await {
            Ok(document) => {
                self.metrics.increment_uploads();
                info!(document.id = %document.id, size = size_bytes, "document uploaded");
                Ok(document)
            }
            Err(e) => {
                if let Err(cleanup) = self.blobs.delete(&storage_key).await {
                    warn!(key = %storage_key, error = %cleanup, "orphan blob cleanup failed");
                }
                Err(e)
            }
        }
    }

    /// Metadata only, subject to the read policy.
    #[instrument(skip(self, ctx), fields(actor.id = %ctx.actor_id))]
    pub async fn get_metadata(
        &self,
        ctx: &AccessContext,
        document_id: &DocumentId,
    ) -> Result<Document, VaultError> {
        let document = self.catalog.get(document_id).await?;
        self.authorize_read(ctx, &document).await?;
        Ok(document)
    }

    /// Bytes and metadata for an authenticated caller.
    #[instrument(skip(self, ctx), fields(actor.id = %ctx.actor_id))]
    pub async fn fetch_authenticated(
        &self,
        ctx: &AccessContext,
        document_id: &DocumentId,
    ) -> Result<Retrieved, VaultError> {
        let document = self.catalog.get(document_id).await?;
        self.authorize_read(ctx, &document).await?;
        let retrieved = self.read_blob(document).await?;
        self.metrics.increment_downloads();
        Ok(retrieved)
    }

    /// Mint a single-use download link for `document_id`.
    #[instrument(skip(self, ctx), fields(actor.id = %ctx.actor_id))]
    pub async fn issue_download_token(
        &self,
        ctx: &AccessContext,
        document_id: &DocumentId,
        ttl: Option<Duration>,
    ) -> Result<IssuedToken, VaultError> {
        let document = self.catalog.get(document_id).await?;
        let ctx = self.with_facts(ctx, [&document]).await;
        match self.tokens.issue(&ctx, &document, ttl).await {
            Ok(issued) => {
                self.metrics.increment_tokens_issued();
                Ok(issued)
            }
            Err(VaultError::Forbidden) => {
                self.metrics.increment_access_denied();
                Err(VaultError::Forbidden)
            }
            Err(e) => Err(e),
        }
    }

    /// Redeem a download token and return the document it grants.
    ///
    /// No access policy check happens here; the token is the credential.
    #[instrument(skip(self, token_value), fields(token = %token_fingerprint(token_value)))]
    pub async fn fetch_by_token(&self, token_value: &str) -> Result<Retrieved, VaultError> {
        let token = match self.tokens.redeem(token_value).await {
            Ok(token) => token,
            Err(e) => {
                if e.is_redemption_failure() {
                    self.metrics.increment_redemptions_rejected();
                    let reason = match &e {
                        VaultError::Expired => "expired",
                        VaultError::AlreadyUsed => "already_used",
                        _ => "not_found",
                    };
                    info!(reason, "download token rejected");
                }
                return Err(e);
            }
        };

        self.metrics.increment_tokens_redeemed();
        let document = self.catalog.get(&token.document_id).await?;
        self.read_blob(document).await
    }

    /// Outstanding token records for a document the caller may read.
    pub async fn tokens_for_document(
        &self,
        ctx: &AccessContext,
        document_id: &DocumentId,
    ) -> Result<Vec<DownloadToken>, VaultError> {
        let document = self.catalog.get(document_id).await?;
        self.authorize_read(ctx, &document).await?;
        self.tokens.tokens_for_document(document_id).await
    }

    /// Documents uploaded by `owner` that the caller may read.
    pub async fn list_by_owner(
        &self,
        ctx: &AccessContext,
        owner: &ActorId,
    ) -> Result<Vec<Document>, VaultError> {
        let documents = self.catalog.list_by_owner(owner).await?;
        Ok(self.readable(ctx, documents).await)
    }

    /// Documents attached to `(kind, ref_id)` that the caller may read.
    pub async fn list_by_context(
        &self,
        ctx: &AccessContext,
        kind: ContextKind,
        ref_id: &str,
    ) -> Result<Vec<Document>, VaultError> {
        let documents = self.catalog.list_by_context(kind, ref_id).await?;
        Ok(self.readable(ctx, documents).await)
    }

    /// Catalog totals. Administrators only.
    pub async fn storage_stats(&self, ctx: &AccessContext) -> Result<CatalogStats, VaultError> {
        if !ctx.is_administrator() {
            self.metrics.increment_access_denied();
            return Err(VaultError::Forbidden);
        }
        self.catalog.stats().await
    }

    /// Remove token records past their retention window.
    pub async fn reap_tokens(&self) -> Result<u64, VaultError> {
        let removed = self.tokens.reap(self.clock.now()).await?;
        self.metrics.add_tokens_reaped(removed);
        Ok(removed)
    }

    async fn authorize_read(
        &self,
        ctx: &AccessContext,
        document: &Document,
    ) -> Result<(), VaultError> {
        let ctx = self.with_facts(ctx, [document]).await;
        let decision = policy::evaluate_read(&ctx, document);
        if decision.is_allowed() {
            Ok(())
        } else {
            self.metrics.increment_access_denied();
            warn!(document.id = %document.id, role = %ctx.role, "read denied");
            Err(VaultError::Forbidden)
        }
    }

    async fn readable(&self, ctx: &AccessContext, documents: Vec<Document>) -> Vec<Document> {
        let ctx = self.with_facts(ctx, &documents).await;
        documents
            .into_iter()
            .filter(|doc| policy::can_read(&ctx, doc))
            .collect()
    }

    /// Copy of `ctx` with relationship facts for every patient the given
    /// documents are about. Each patient is looked up at most once.
    async fn with_facts<'a>(
        &self,
        ctx: &AccessContext,
        documents: impl IntoIterator<Item = &'a Document>,
    ) -> AccessContext {
        let mut enriched = ctx.clone();
        let Some(kind) = ctx.role.mapping_kind() else {
            return enriched;
        };

        let mut seen = HashSet::new();
        for document in documents {
            if document.owner_actor_id == ctx.actor_id {
                continue;
            }
            let Some(patient) = policy::subject_patient(document) else {
                continue;
            };
            if !seen.insert(patient.clone()) {
                continue;
            }
            let status = relationship::lookup(
                self.relationships.as_ref(),
                self.relationship_timeout,
                kind,
                &ctx.actor_id,
                patient,
            )
            .await;
            enriched = enriched.with_fact(kind, patient.clone(), status);
        }
        enriched
    }

    async fn read_blob(&self, document: Document) -> Result<Retrieved, VaultError> {
        match self.blobs.get(&document.storage_key).await? {
            Some(data) => {
                if data.len() as u64 != document.size_bytes {
                    return Err(VaultError::Integrity(format!(
                        "document {} expected {} bytes, blob has {}",
                        document.id,
                        document.size_bytes,
                        data.len()
                    )));
                }
                Ok(Retrieved { document, data })
            }
            None => Err(VaultError::Integrity(format!(
                "blob for document {} is missing",
                document.id
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_content_type_from_extension() {
        assert_eq!(infer_content_type("scan.pdf"), "application/pdf");
        assert_eq!(infer_content_type("notes.txt"), "text/plain");
        assert_eq!(infer_content_type("blob"), DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn disposition_quotes_and_encodes() {
        assert_eq!(
            content_disposition("report.pdf"),
            "attachment; filename=\"report.pdf\"; filename*=UTF-8''report.pdf"
        );
        assert_eq!(
            content_disposition("résumé \"v2\".pdf"),
            "attachment; filename=\"r_sum_ _v2_.pdf\"; filename*=UTF-8''r%C3%A9sum%C3%A9%20%22v2%22.pdf"
        );
    }
}
