pub mod documents;
pub mod download;
pub mod health;
pub mod openapi;
pub mod schemas;
pub mod storage;
pub mod trace;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use medidoc_vault::Vault;

use crate::auth::{AuthLayer, JwtManager};

use self::openapi::ApiDoc;

/// Allowance on top of the document size limit for multipart framing and
/// the metadata fields.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// The document vault.
    pub vault: Arc<Vault>,
    /// Bearer token verification.
    pub auth: Arc<JwtManager>,
    /// Base URL used to build download links in descriptors.
    pub external_url: String,
}

/// Build the Axum router with all API routes, middleware, and Swagger UI.
pub fn router(state: AppState) -> Router {
    let upload_limit = usize::try_from(state.vault.catalog().max_size_bytes())
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    let public = Router::new()
        // Health & metrics (always public)
        .route("/health", get(health::health))
        .route("/metrics", get(health::metrics))
        // Download links authenticate by the token itself
        .route("/v1/download/{token}", get(download::redeem));

    let protected = Router::new()
        .route(
            "/v1/documents/upload",
            post(documents::upload).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/v1/documents", get(documents::list_documents))
        .route("/v1/documents/{id}", get(documents::get_document))
        .route(
            "/v1/documents/{id}/download",
            get(documents::download_document),
        )
        .route(
            "/v1/documents/{id}/download-token",
            post(documents::issue_download_token),
        )
        .route("/v1/documents/{id}/tokens", get(documents::list_tokens))
        .route("/v1/storage/stats", get(storage::storage_stats))
        .layer(AuthLayer::new(Arc::clone(&state.auth)));

    Router::new()
        .merge(public)
        .merge(protected)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(self::trace::request_span::<axum::body::Body>),
        )
        .layer(CorsLayer::permissive())
}
