use async_trait::async_trait;

use crate::error::StateError;
use crate::key::{KeyKind, StateKey};

/// A value together with the version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned {
    pub value: String,
    pub version: u64,
}

/// Result of a compare-and-swap operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasResult {
    /// The swap succeeded and the new version is stored.
    Ok,
    /// The swap failed because the current version didn't match.
    Conflict {
        current_value: Option<String>,
        current_version: u64,
    },
}

/// Trait for persisting catalog and token records.
///
/// Implementations must be `Send + Sync` and safe for concurrent access.
/// Every write that decides a race (`check_and_set`, `compare_and_swap`) must
/// be a single atomic operation in the backend.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Check if a key exists; if not, set it atomically at version 1.
    /// Returns `true` if the key was newly set, `false` if it already existed.
    async fn check_and_set(&self, key: &StateKey, value: &str) -> Result<bool, StateError>;

    /// Get the value for a key. Returns `None` if not found.
    async fn get(&self, key: &StateKey) -> Result<Option<String>, StateError> {
        Ok(self.get_versioned(key).await?.map(|v| v.value))
    }

    /// Get the value and its current version.
    async fn get_versioned(&self, key: &StateKey) -> Result<Option<Versioned>, StateError>;

    /// Compare-and-swap: update value only if the current version matches.
    ///
    /// A successful swap bumps the version by one.
    async fn compare_and_swap(
        &self,
        key: &StateKey,
        expected_version: u64,
        new_value: &str,
    ) -> Result<CasResult, StateError>;

    /// Delete a key. Returns `true` if the key existed.
    async fn delete(&self, key: &StateKey) -> Result<bool, StateError>;

    /// Scan entries of one kind whose id starts with `prefix`.
    ///
    /// Returns `(id, value)` pairs. This operation may be expensive on some
    /// backends.
    async fn scan_keys(
        &self,
        kind: KeyKind,
        prefix: Option<&str>,
    ) -> Result<Vec<(String, String)>, StateError>;

    /// Add a key to the expiry index. `expires_at_ms` is a Unix timestamp in
    /// milliseconds. Re-indexing a key replaces its previous deadline.
    async fn index_expiry(&self, key: &StateKey, expires_at_ms: i64) -> Result<(), StateError>;

    /// Remove a key from the expiry index.
    async fn remove_expiry_index(&self, key: &StateKey) -> Result<(), StateError>;

    /// Keys of the given kind whose indexed deadline is `<= now_ms`.
    async fn get_expired(&self, kind: KeyKind, now_ms: i64)
    -> Result<Vec<StateKey>, StateError>;
}
