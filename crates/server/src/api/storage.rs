use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;

use medidoc_core::AccessContext;

use crate::error::ServerError;

use super::AppState;
use super::schemas::{ErrorResponse, StorageStatsResponse};

/// `GET /v1/storage/stats` -- catalog totals.
#[utoipa::path(
    get,
    path = "/v1/storage/stats",
    tag = "Storage",
    summary = "Storage statistics",
    description = "Total number of documents and bytes stored. Administrators only.",
    responses(
        (status = 200, description = "Catalog totals", body = StorageStatsResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "Forbidden", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn storage_stats(
    State(state): State<AppState>,
    axum::Extension(ctx): axum::Extension<AccessContext>,
) -> Result<impl IntoResponse, ServerError> {
    let stats = state.vault.storage_stats(&ctx).await?;
    Ok(Json(StorageStatsResponse::from(stats)))
}
