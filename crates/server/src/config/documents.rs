use serde::Deserialize;

use medidoc_vault::DEFAULT_MAX_UPLOAD_BYTES;

/// Upload limits.
#[derive(Debug, Deserialize)]
pub struct DocumentsConfig {
    /// Largest accepted document, in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_max_upload_bytes() -> u64 {
    DEFAULT_MAX_UPLOAD_BYTES
}

/// Download token lifetimes.
#[derive(Debug, Deserialize)]
pub struct TokensConfig {
    /// Lifetime applied when the caller does not ask for one.
    #[serde(default = "default_ttl_seconds")]
    pub default_ttl_seconds: u64,

    /// Longest lifetime a caller may request.
    #[serde(default = "default_max_ttl_seconds")]
    pub max_ttl_seconds: u64,

    /// How long token records are kept after expiry before the reaper
    /// removes them.
    #[serde(default = "default_retention_seconds")]
    pub retention_seconds: u64,

    /// Interval between reaper sweeps.
    #[serde(default = "default_cleanup_interval_seconds")]
    pub cleanup_interval_seconds: u64,
}

impl Default for TokensConfig {
    fn default() -> Self {
        Self {
            default_ttl_seconds: default_ttl_seconds(),
            max_ttl_seconds: default_max_ttl_seconds(),
            retention_seconds: default_retention_seconds(),
            cleanup_interval_seconds: default_cleanup_interval_seconds(),
        }
    }
}

fn default_ttl_seconds() -> u64 {
    300
}

fn default_max_ttl_seconds() -> u64 {
    3_600
}

fn default_retention_seconds() -> u64 {
    3_600
}

fn default_cleanup_interval_seconds() -> u64 {
    60
}
