use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use medidoc_core::{ActorRole, Document, DownloadToken, IssuedToken, OwnerContext};
use medidoc_vault::{CatalogStats, MetricsSnapshot};

/// Health check response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Service status indicator.
    #[schema(example = "ok")]
    pub status: String,
    /// Current vault metrics snapshot.
    pub metrics: MetricsResponse,
}

/// Vault operation counters.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MetricsResponse {
    /// Documents uploaded.
    #[schema(example = 42)]
    pub uploads: u64,
    /// Authenticated downloads served.
    #[schema(example = 120)]
    pub downloads: u64,
    /// Download tokens issued.
    #[schema(example = 17)]
    pub tokens_issued: u64,
    /// Download tokens redeemed successfully.
    #[schema(example = 15)]
    pub tokens_redeemed: u64,
    /// Token redemptions rejected (expired, used, or unknown).
    #[schema(example = 2)]
    pub redemptions_rejected: u64,
    /// Requests denied by the access policy.
    #[schema(example = 3)]
    pub access_denied: u64,
    /// Token records removed by the reaper.
    #[schema(example = 10)]
    pub tokens_reaped: u64,
}

impl From<MetricsSnapshot> for MetricsResponse {
    fn from(snap: MetricsSnapshot) -> Self {
        Self {
            uploads: snap.uploads,
            downloads: snap.downloads,
            tokens_issued: snap.tokens_issued,
            tokens_redeemed: snap.tokens_redeemed,
            redemptions_rejected: snap.redemptions_rejected,
            access_denied: snap.access_denied,
            tokens_reaped: snap.tokens_reaped,
        }
    }
}

/// Generic error response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message.
    #[schema(example = "access denied")]
    pub error: String,
}

/// Document descriptor returned by every document endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DocumentResponse {
    #[schema(example = "5f0c1a3e-9d7b-4c2a-8e61-2b4f7d9a0c13")]
    pub id: String,
    /// Actor that uploaded the document.
    #[schema(example = "patient-17")]
    pub owner_actor_id: String,
    /// Role of the uploader at upload time.
    pub uploaded_by_role: ActorRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_context: Option<OwnerContext>,
    #[schema(example = "blood-panel.pdf")]
    pub file_name: String,
    #[schema(example = "application/pdf")]
    pub content_type: String,
    #[schema(example = 48213)]
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remark: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Authenticated download URL for the document bytes.
    #[schema(example = "https://docs.example.com/v1/documents/5f0c1a3e-9d7b-4c2a-8e61-2b4f7d9a0c13/download")]
    pub download_link: String,
}

impl DocumentResponse {
    pub fn new(document: Document, external_url: &str) -> Self {
        let download_link = format!("{external_url}/v1/documents/{}/download", document.id);
        Self {
            id: document.id.to_string(),
            owner_actor_id: document.owner_actor_id.to_string(),
            uploaded_by_role: document.uploaded_by_role,
            owner_context: document.owner_context,
            file_name: document.file_name,
            content_type: document.content_type,
            size_bytes: document.size_bytes,
            remark: document.remark,
            created_at: document.created_at,
            download_link,
        }
    }
}

/// Response for listing documents.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ListDocumentsResponse {
    pub documents: Vec<DocumentResponse>,
    #[schema(example = 3)]
    pub count: usize,
}

/// Multipart form accepted by the upload endpoint.
#[derive(Debug, ToSchema)]
pub struct UploadForm {
    /// The file contents. The part's file name becomes the document name.
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
    /// Record kind: `case_history`, `report`, `message_attachment` or `other`.
    pub context: Option<String>,
    /// Identifier of the case history, report or message.
    pub ref_id: Option<String>,
    /// The patient the record belongs to.
    pub patient_id: Option<String>,
    pub remark: Option<String>,
    /// Overrides the content type; inferred from the file name when absent.
    pub content_type: Option<String>,
}

/// Request body for issuing a download token.
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct IssueTokenRequest {
    /// Requested lifetime in seconds. The configured default applies when absent.
    #[serde(default)]
    #[schema(example = 300)]
    pub ttl_seconds: Option<i64>,
}

/// A freshly issued single-use download link.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct IssueTokenResponse {
    /// The secret token. Shown once; only its digest is stored.
    pub token_value: String,
    /// Public URL that redeems the token.
    pub download_url: String,
    pub expires_at: DateTime<Utc>,
    #[schema(example = 300)]
    pub ttl_seconds: i64,
}

impl From<IssuedToken> for IssueTokenResponse {
    fn from(issued: IssuedToken) -> Self {
        let ttl_seconds = issued.ttl_seconds();
        Self {
            token_value: issued.token_value,
            download_url: issued.download_url,
            expires_at: issued.record.expires_at,
            ttl_seconds,
        }
    }
}

/// Stored token record, identified only by a digest fingerprint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenSummary {
    /// Leading characters of the token's SHA-256 digest.
    #[schema(example = "3fa9c01b7e42")]
    pub fingerprint: String,
    pub issued_to_actor_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub redeemed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redeemed_at: Option<DateTime<Utc>>,
}

impl From<&DownloadToken> for TokenSummary {
    fn from(token: &DownloadToken) -> Self {
        Self {
            fingerprint: token.fingerprint().to_owned(),
            issued_to_actor_id: token.issued_to_actor_id.to_string(),
            issued_at: token.issued_at,
            expires_at: token.expires_at,
            redeemed: token.redeemed,
            redeemed_at: token.redeemed_at,
        }
    }
}

/// Response for listing a document's tokens.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ListTokensResponse {
    pub tokens: Vec<TokenSummary>,
}

/// Catalog totals.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StorageStatsResponse {
    #[schema(example = 1280)]
    pub documents: u64,
    #[schema(example = 734_003_200)]
    pub total_bytes: u64,
}

impl From<CatalogStats> for StorageStatsResponse {
    fn from(stats: CatalogStats) -> Self {
        Self {
            documents: stats.documents,
            total_bytes: stats.total_bytes,
        }
    }
}
