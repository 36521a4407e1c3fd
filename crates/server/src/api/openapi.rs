#![allow(clippy::needless_for_each)]

use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};

use medidoc_core::{ActorRole, ContextKind, OwnerContext};

use super::schemas::{
    DocumentResponse, ErrorResponse, HealthResponse, IssueTokenRequest, IssueTokenResponse,
    ListDocumentsResponse, ListTokensResponse, MetricsResponse, StorageStatsResponse,
    TokenSummary, UploadForm,
};

/// Registers the bearer token scheme referenced by protected endpoints.
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(utoipa::OpenApi)]
#[openapi(
    info(
        title = "Medidoc Document Vault API",
        version = "0.1.0",
        description = "HTTP API for storing healthcare documents, reading them under role and relationship based access rules, and sharing them through single-use download links.",
        license(name = "Apache-2.0")
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "Health", description = "Service health and metrics"),
        (name = "Documents", description = "Upload, metadata, listing and authenticated download"),
        (name = "Downloads", description = "Public single-use download links"),
        (name = "Storage", description = "Storage statistics"),
    ),
    paths(
        super::health::health,
        super::health::metrics,
        super::documents::upload,
        super::documents::list_documents,
        super::documents::get_document,
        super::documents::download_document,
        super::documents::issue_download_token,
        super::documents::list_tokens,
        super::download::redeem,
        super::storage::storage_stats,
    ),
    components(schemas(
        ActorRole, ContextKind, OwnerContext,
        HealthResponse, MetricsResponse, ErrorResponse,
        DocumentResponse, ListDocumentsResponse, UploadForm,
        IssueTokenRequest, IssueTokenResponse, TokenSummary, ListTokensResponse,
        StorageStatsResponse,
    ))
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use utoipa::OpenApi;

    use super::*;

    #[test]
    fn document_paths_are_published() {
        let doc = ApiDoc::openapi();
        for path in [
            "/v1/documents/upload",
            "/v1/documents/{id}/download-token",
            "/v1/download/{token}",
            "/v1/storage/stats",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }

    #[test]
    fn bearer_scheme_is_registered() {
        let doc = ApiDoc::openapi();
        let components = doc.components.unwrap();
        assert!(components.security_schemes.contains_key("bearer"));
    }
}
