mod auth;
mod blob;
mod documents;
mod relationships;
mod server;
mod state;


pub use auth::*;
pub use blob::*;
pub use documents::*;
pub use relationships::*;
pub use server::*;
pub use state::*;

use serde::Deserialize;

/// Top-level configuration for the medidoc server, loaded from a TOML file.
#[derive(Debug, Default, Deserialize)]
pub struct MedidocConfig {
    /// HTTP server bind configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// State backend holding the catalog and token records.
    #[serde(default)]
    pub state: StateConfig,
    /// Blob backend holding document bytes.
    #[serde(default)]
    pub blob: BlobConfig,
    /// Upload limits.
    #[serde(default)]
    pub documents: DocumentsConfig,
    /// Download token lifetimes and cleanup.
    #[serde(default)]
    pub tokens: TokensConfig,
    /// Bearer token verification.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Where doctor/hospital to patient mappings come from.
    #[serde(default)]
    pub relationships: RelationshipsConfig,
}
