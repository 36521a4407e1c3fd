use axum::extract::{Path, State};
use axum::http::{HeaderValue, header};
use axum::response::{IntoResponse, Response};

use medidoc_vault::{DEFAULT_CONTENT_TYPE, Retrieved};

use crate::error::ServerError;

use super::AppState;
use super::schemas::ErrorResponse;

/// Build the byte response shared by authenticated and token downloads.
pub(super) fn file_response(retrieved: Retrieved) -> Response {
    let content_type = HeaderValue::from_str(retrieved.content_type())
        .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
    let disposition = HeaderValue::from_str(&retrieved.content_disposition())
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    (
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-store")),
        ],
        retrieved.data,
    )
        .into_response()
}

/// `GET /v1/download/{token}` -- redeem a single-use download link.
///
/// Unauthenticated. Every failure produces the same `404` body; the precise
/// reason is only logged.
#[utoipa::path(
    get,
    path = "/v1/download/{token}",
    tag = "Downloads",
    summary = "Redeem download link",
    description = "Redeems a single-use download token and returns the document bytes. Expired, already used and unknown tokens are indistinguishable.",
    params(
        ("token" = String, Path, description = "Download token value")
    ),
    responses(
        (status = 200, description = "Document bytes", content_type = "application/octet-stream"),
        (status = 404, description = "Invalid or expired link", body = ErrorResponse),
        (status = 503, description = "Storage temporarily unavailable", body = ErrorResponse),
    )
)]
pub async fn redeem(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Response, ServerError> {
    match state.vault.fetch_by_token(&token).await {
        Ok(retrieved) => Ok(file_response(retrieved)),
        Err(e) if e.is_redemption_failure() => Err(ServerError::InvalidDownloadLink),
        Err(e) => Err(e.into()),
    }
}
