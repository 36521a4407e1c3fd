//! Document endpoints: upload, metadata, listing, authenticated download and
//! download link issuance.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use utoipa::IntoParams;

use medidoc_core::{AccessContext, ActorId, ContextKind, DocumentId, OwnerContext};
use medidoc_vault::Upload;

use crate::error::ServerError;

use super::AppState;
use super::download::file_response;
use super::schemas::{
    DocumentResponse, ErrorResponse, IssueTokenRequest, IssueTokenResponse,
    ListDocumentsResponse, ListTokensResponse, TokenSummary, UploadForm,
};

/// Query parameters for listing documents.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListDocumentsQuery {
    /// Owner actor id, or `me` for the caller.
    pub owner: Option<String>,
    /// Record kind the documents are attached to. Requires `ref_id`.
    pub context: Option<String>,
    /// Identifier of the record the documents are attached to.
    pub ref_id: Option<String>,
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

fn parse_context_kind(raw: &str) -> Result<ContextKind, ServerError> {
    raw.parse::<ContextKind>()
        .map_err(|e| ServerError::BadRequest(e.to_string()))
}

/// Fields collected from the upload form before they become an [`Upload`].
#[derive(Debug, Default)]
struct UploadParts {
    file_name: Option<String>,
    part_content_type: Option<String>,
    data: Option<Bytes>,
    context: Option<String>,
    ref_id: Option<String>,
    patient_id: Option<String>,
    remark: Option<String>,
    content_type: Option<String>,
}

impl UploadParts {
    async fn read(mut multipart: Multipart) -> Result<Self, ServerError> {
        let mut parts = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_owned) else {
                continue;
            };
            match name.as_str() {
                "file" => {
                    parts.file_name = field.file_name().map(str::to_owned);
                    parts.part_content_type = field.content_type().map(str::to_owned);
                    parts.data = Some(field.bytes().await?);
                }
                "context" => parts.context = non_empty(field.text().await?),
                "ref_id" => parts.ref_id = non_empty(field.text().await?),
                "patient_id" => parts.patient_id = non_empty(field.text().await?),
                "remark" => parts.remark = non_empty(field.text().await?),
                // An explicit empty value is kept so the vault rejects it.
                "content_type" => parts.content_type = Some(field.text().await?.trim().to_owned()),
                other => tracing::debug!(field = other, "ignoring unknown upload field"),
            }
        }
        Ok(parts)
    }

    fn into_upload(self) -> Result<Upload, ServerError> {
        let data = self
            .data
            .ok_or_else(|| ServerError::BadRequest("missing 'file' part".into()))?;

        let owner_context = match self.context {
            Some(raw) => {
                let mut context = OwnerContext::new(parse_context_kind(&raw)?);
                context.ref_id = self.ref_id;
                context.patient_id = self.patient_id.map(ActorId::from);
                Some(context)
            }
            None if self.ref_id.is_some() || self.patient_id.is_some() => {
                return Err(ServerError::BadRequest(
                    "'ref_id' and 'patient_id' require 'context'".into(),
                ));
            }
            None => None,
        };

        // Generic part types carry no information; let the vault infer one.
        let content_type = self.content_type.or_else(|| {
            self.part_content_type
                .filter(|t| t != medidoc_vault::DEFAULT_CONTENT_TYPE)
        });

        Ok(Upload {
            file_name: self.file_name.unwrap_or_default(),
            content_type,
            owner_context,
            remark: self.remark,
            data,
        })
    }
}

/// `POST /v1/documents/upload` -- store a new document.
#[utoipa::path(
    post,
    path = "/v1/documents/upload",
    tag = "Documents",
    summary = "Upload document",
    description = "Stores a file and its metadata. The caller becomes the owner.",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Document stored", body = DocumentResponse),
        (status = 400, description = "Invalid metadata", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 413, description = "Document too large", body = ErrorResponse),
        (status = 503, description = "Storage temporarily unavailable", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn upload(
    State(state): State<AppState>,
    axum::Extension(ctx): axum::Extension<AccessContext>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ServerError> {
    let upload = UploadParts::read(multipart).await?.into_upload()?;
    let document = state.vault.upload(&ctx, upload).await?;
    Ok((
        StatusCode::CREATED,
        Json(DocumentResponse::new(document, &state.external_url)),
    ))
}

/// `GET /v1/documents` -- list documents by owner or by attached record.
#[utoipa::path(
    get,
    path = "/v1/documents",
    tag = "Documents",
    summary = "List documents",
    description = "Lists documents owned by an actor (`owner`) or attached to a record (`context` + `ref_id`). Only documents the caller may read are returned.",
    params(ListDocumentsQuery),
    responses(
        (status = 200, description = "Readable documents", body = ListDocumentsResponse),
        (status = 400, description = "Invalid filter", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn list_documents(
    State(state): State<AppState>,
    axum::Extension(ctx): axum::Extension<AccessContext>,
    Query(query): Query<ListDocumentsQuery>,
) -> Result<impl IntoResponse, ServerError> {
    let documents = match (query.owner, query.context, query.ref_id) {
        (Some(owner), None, None) => {
            let owner = if owner == "me" {
                ctx.actor_id.clone()
            } else {
                ActorId::new(owner)
            };
            state.vault.list_by_owner(&ctx, &owner).await?
        }
        (None, Some(context), Some(ref_id)) => {
            let kind = parse_context_kind(&context)?;
            state.vault.list_by_context(&ctx, kind, &ref_id).await?
        }
        _ => {
            return Err(ServerError::BadRequest(
                "specify either 'owner' or both 'context' and 'ref_id'".into(),
            ));
        }
    };

    let documents: Vec<DocumentResponse> = documents
        .into_iter()
        .map(|d| DocumentResponse::new(d, &state.external_url))
        .collect();
    let count = documents.len();
    Ok(Json(ListDocumentsResponse { documents, count }))
}

/// `GET /v1/documents/{id}` -- document metadata.
#[utoipa::path(
    get,
    path = "/v1/documents/{id}",
    tag = "Documents",
    summary = "Get document",
    description = "Returns the document descriptor if the caller may read it.",
    params(
        ("id" = String, Path, description = "Document id")
    ),
    responses(
        (status = 200, description = "Document descriptor", body = DocumentResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "Forbidden", body = ErrorResponse),
        (status = 404, description = "Document not found", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn get_document(
    State(state): State<AppState>,
    axum::Extension(ctx): axum::Extension<AccessContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    let document = state.vault.get_metadata(&ctx, &DocumentId::new(id)).await?;
    Ok(Json(DocumentResponse::new(document, &state.external_url)))
}

/// `GET /v1/documents/{id}/download` -- authenticated download.
#[utoipa::path(
    get,
    path = "/v1/documents/{id}/download",
    tag = "Documents",
    summary = "Download document",
    description = "Returns the document bytes with `Content-Type` and `Content-Disposition` taken from its metadata.",
    params(
        ("id" = String, Path, description = "Document id")
    ),
    responses(
        (status = 200, description = "Document bytes", content_type = "application/octet-stream"),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "Forbidden", body = ErrorResponse),
        (status = 404, description = "Document not found", body = ErrorResponse),
        (status = 503, description = "Storage temporarily unavailable", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn download_document(
    State(state): State<AppState>,
    axum::Extension(ctx): axum::Extension<AccessContext>,
    Path(id): Path<String>,
) -> Result<Response, ServerError> {
    let retrieved = state
        .vault
        .fetch_authenticated(&ctx, &DocumentId::new(id))
        .await?;
    Ok(file_response(retrieved))
}

/// `POST /v1/documents/{id}/download-token` -- issue a single-use link.
#[utoipa::path(
    post,
    path = "/v1/documents/{id}/download-token",
    tag = "Documents",
    summary = "Issue download link",
    description = "Mints a single-use, time-limited download link. The body is optional; without it the default lifetime applies.",
    params(
        ("id" = String, Path, description = "Document id")
    ),
    request_body(content = IssueTokenRequest, content_type = "application/json"),
    responses(
        (status = 201, description = "Link issued", body = IssueTokenResponse),
        (status = 400, description = "Invalid lifetime", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "Forbidden", body = ErrorResponse),
        (status = 404, description = "Document not found", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn issue_download_token(
    State(state): State<AppState>,
    axum::Extension(ctx): axum::Extension<AccessContext>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, ServerError> {
    let request: IssueTokenRequest = if body.iter().all(u8::is_ascii_whitespace) {
        IssueTokenRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ServerError::BadRequest(format!("invalid request body: {e}")))?
    };

    let ttl = request
        .ttl_seconds
        .map(|secs| {
            chrono::Duration::try_seconds(secs).ok_or_else(|| {
                ServerError::BadRequest(format!("ttl_seconds out of range: {secs}"))
            })
        })
        .transpose()?;
    let issued = state
        .vault
        .issue_download_token(&ctx, &DocumentId::new(id), ttl)
        .await?;
    Ok((StatusCode::CREATED, Json(IssueTokenResponse::from(issued))))
}

/// `GET /v1/documents/{id}/tokens` -- token records for a document.
#[utoipa::path(
    get,
    path = "/v1/documents/{id}/tokens",
    tag = "Documents",
    summary = "List download links",
    description = "Lists the download token records of a document, newest first. Token values are never returned.",
    params(
        ("id" = String, Path, description = "Document id")
    ),
    responses(
        (status = 200, description = "Token records", body = ListTokensResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "Forbidden", body = ErrorResponse),
        (status = 404, description = "Document not found", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn list_tokens(
    State(state): State<AppState>,
    axum::Extension(ctx): axum::Extension<AccessContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    let tokens = state
        .vault
        .tokens_for_document(&ctx, &DocumentId::new(id))
        .await?;
    Ok(Json(ListTokensResponse {
        tokens: tokens.iter().map(TokenSummary::from).collect(),
    }))
}
