use thiserror::Error;

use medidoc_blob::BlobError;
use medidoc_state::StateError;

/// Errors surfaced by vault operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Malformed upload metadata or request parameters.
    #[error("validation error: {0}")]
    Validation(String),

    /// The upload exceeds the configured maximum size.
    #[error("document too large: {size} bytes exceeds limit of {limit} bytes")]
    TooLarge { size: u64, limit: u64 },

    /// The access policy denied the request.
    #[error("access denied")]
    Forbidden,

    /// A document or token does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The download token is past its expiry.
    #[error("download token expired")]
    Expired,

    /// The download token has already been redeemed.
    #[error("download token already used")]
    AlreadyUsed,

    /// Transient infrastructure failure.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A catalog record references bytes that are missing from the blob store.
    #[error("integrity error: {0}")]
    Integrity(String),

    /// Non-transient blob storage failure.
    #[error("blob storage error: {0}")]
    Storage(String),

    /// An error occurred in the state store.
    #[error("state error: {0}")]
    State(#[from] StateError),

    /// The vault was misconfigured (e.g. missing required components).
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<BlobError> for VaultError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::NotFound(key) => Self::Integrity(format!("blob {key} is missing")),
            BlobError::Unavailable(msg) => Self::StorageUnavailable(msg),
            BlobError::Storage(msg) => Self::Storage(msg),
        }
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(err: serde_json::Error) -> Self {
        Self::State(StateError::Serialization(err.to_string()))
    }
}

impl VaultError {
    /// Whether this is one of the token redemption failures that must be
    /// hidden from unauthenticated callers.
    pub fn is_redemption_failure(&self) -> bool {
        matches!(self, Self::Expired | Self::AlreadyUsed | Self::NotFound(_))
    }
}
