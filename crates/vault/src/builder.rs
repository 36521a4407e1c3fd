use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;

use medidoc_blob::BlobStore;
use medidoc_core::{Clock, SystemClock};
use medidoc_state::StateStore;

use crate::catalog::DocumentCatalog;
use crate::error::VaultError;
use crate::metrics::VaultMetrics;
use crate::relationship::{RelationshipResolver, StaticRelationships};
use crate::tokens::{TokenManager, TokenSettings};
use crate::vault::Vault;

/// Default upload limit: 25 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 25 * 1024 * 1024;

/// Fluent builder for constructing a [`Vault`].
///
/// A [`StateStore`] and a [`BlobStore`] must be supplied. Without a
/// relationship resolver every relationship lookup answers "not mapped".
pub struct VaultBuilder {
    state: Option<Arc<dyn StateStore>>,
    blobs: Option<Arc<dyn BlobStore>>,
    relationships: Arc<dyn RelationshipResolver>,
    relationship_timeout: StdDuration,
    clock: Arc<dyn Clock>,
    max_upload_bytes: u64,
    tokens: TokenSettings,
}

impl VaultBuilder {
    pub fn new() -> Self {
        Self {
            state: None,
            blobs: None,
            relationships: Arc::new(StaticRelationships::new()),
            relationship_timeout: StdDuration::from_secs(2),
            clock: Arc::new(SystemClock),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            tokens: TokenSettings::default(),
        }
    }

    /// Set the state store holding catalog and token records.
    #[must_use]
    pub fn state(mut self, store: Arc<dyn StateStore>) -> Self {
        self.state = Some(store);
        self
    }

    /// Set the blob store holding document bytes.
    #[must_use]
    pub fn blobs(mut self, store: Arc<dyn BlobStore>) -> Self {
        self.blobs = Some(store);
        self
    }

    #[must_use]
    pub fn relationships(mut self, resolver: Arc<dyn RelationshipResolver>) -> Self {
        self.relationships = resolver;
        self
    }

    /// Deadline for a single relationship lookup.
    #[must_use]
    pub fn relationship_timeout(mut self, timeout: StdDuration) -> Self {
        self.relationship_timeout = timeout;
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn max_upload_bytes(mut self, bytes: u64) -> Self {
        self.max_upload_bytes = bytes;
        self
    }

    #[must_use]
    pub fn default_token_ttl(mut self, ttl: Duration) -> Self {
        self.tokens.default_ttl = ttl;
        self
    }

    #[must_use]
    pub fn max_token_ttl(mut self, ttl: Duration) -> Self {
        self.tokens.max_ttl = ttl;
        self
    }

    /// How long dead token records are kept before reaping.
    #[must_use]
    pub fn token_retention(mut self, retention: Duration) -> Self {
        self.tokens.retention = retention;
        self
    }

    /// Public base URL used to build download links.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.tokens.base_url = url.into();
        self
    }

    /// Consume the builder and produce a configured [`Vault`].
    ///
    /// Returns a [`VaultError::Configuration`] if a required store is missing
    /// or the token lifetimes are inconsistent.
    pub fn build(self) -> Result<Vault, VaultError> {
        let state = self
            .state
            .ok_or_else(|| VaultError::Configuration("state store is required".into()))?;

        let blobs = self
            .blobs
            .ok_or_else(|| VaultError::Configuration("blob store is required".into()))?;

        if self.tokens.default_ttl <= Duration::zero() {
            return Err(VaultError::Configuration(
                "default token ttl must be positive".into(),
            ));
        }
        if self.tokens.default_ttl > self.tokens.max_ttl {
            return Err(VaultError::Configuration(
                "default token ttl exceeds the maximum".into(),
            ));
        }
        if self.tokens.retention < Duration::zero() {
            return Err(VaultError::Configuration(
                "token retention must not be negative".into(),
            ));
        }

        Ok(Vault {
            catalog: DocumentCatalog::new(Arc::clone(&state), self.max_upload_bytes),
            tokens: TokenManager::new(state, Arc::clone(&self.clock), self.tokens),
            blobs,
            relationships: self.relationships,
            relationship_timeout: self.relationship_timeout,
            clock: self.clock,
            metrics: Arc::new(VaultMetrics::default()),
        })
    }
}

impl Default for VaultBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use medidoc_blob_memory::MemoryBlobStore;
    use medidoc_state_memory::MemoryStateStore;

    use super::*;

    #[test]
    fn build_missing_state_returns_error() {
        let result = VaultBuilder::new()
            .blobs(Arc::new(MemoryBlobStore::new()))
            .build();
        let err = result.unwrap_err();
        assert!(err.to_string().contains("state store is required"));
    }

    #[test]
    fn build_missing_blobs_returns_error() {
        let result = VaultBuilder::new()
            .state(Arc::new(MemoryStateStore::new()))
            .build();
        let err = result.unwrap_err();
        assert!(err.to_string().contains("blob store is required"));
    }

    #[test]
    fn build_rejects_default_ttl_above_max() {
        let result = VaultBuilder::new()
            .state(Arc::new(MemoryStateStore::new()))
            .blobs(Arc::new(MemoryBlobStore::new()))
            .default_token_ttl(Duration::seconds(7200))
            .build();
        assert!(matches!(result, Err(VaultError::Configuration(_))));
    }

    #[test]
    fn build_with_required_fields_succeeds() {
        let vault = VaultBuilder::new()
            .state(Arc::new(MemoryStateStore::new()))
            .blobs(Arc::new(MemoryBlobStore::new()))
            .base_url("https://vault.example.org/")
            .build()
            .unwrap();
        assert_eq!(vault.catalog().max_size_bytes(), DEFAULT_MAX_UPLOAD_BYTES);
        assert_eq!(
            vault.tokens().download_url("abc"),
            "https://vault.example.org/v1/download/abc"
        );
    }
}
