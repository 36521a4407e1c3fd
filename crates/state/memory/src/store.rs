use async_trait::async_trait;
use dashmap::DashMap;

use medidoc_state::error::StateError;
use medidoc_state::key::{KeyKind, StateKey};
use medidoc_state::store::{CasResult, StateStore, Versioned};

/// A single entry in the in-memory store.
#[derive(Debug, Clone)]
struct Entry {
    value: String,
    version: u64,
}

/// In-memory [`StateStore`] backed by a [`DashMap`].
///
/// Conditional writes go through the `DashMap` entry API or a shard write
/// guard, so each one is atomic with respect to other callers. The async
/// trait methods return immediately.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    data: DashMap<StateKey, Entry>,
    expiry: DashMap<StateKey, i64>,
}

impl MemoryStateStore {
    /// Create a new, empty in-memory state store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries, across all kinds.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn check_and_set(&self, key: &StateKey, value: &str) -> Result<bool, StateError> {
        // Use `entry` API for atomicity: only insert if vacant.
        let was_inserted = match self.data.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(Entry {
                    value: value.to_owned(),
                    version: 1,
                });
                true
            }
        };

        Ok(was_inserted)
    }

    async fn get_versioned(&self, key: &StateKey) -> Result<Option<Versioned>, StateError> {
        Ok(self.data.get(key).map(|entry| Versioned {
            value: entry.value.clone(),
            version: entry.version,
        }))
    }

    async fn compare_and_swap(
        &self,
        key: &StateKey,
        expected_version: u64,
        new_value: &str,
    ) -> Result<CasResult, StateError> {
        let Some(mut entry) = self.data.get_mut(key) else {
            return Ok(CasResult::Conflict {
                current_value: None,
                current_version: 0,
            });
        };

        if entry.version != expected_version {
            return Ok(CasResult::Conflict {
                current_value: Some(entry.value.clone()),
                current_version: entry.version,
            });
        }

        new_value.clone_into(&mut entry.value);
        entry.version += 1;

        Ok(CasResult::Ok)
    }

    async fn delete(&self, key: &StateKey) -> Result<bool, StateError> {
        Ok(self.data.remove(key).is_some())
    }

    async fn scan_keys(
        &self,
        kind: KeyKind,
        prefix: Option<&str>,
    ) -> Result<Vec<(String, String)>, StateError> {
        let prefix = prefix.unwrap_or("");
        Ok(self
            .data
            .iter()
            .filter(|item| item.key().kind == kind && item.key().id.starts_with(prefix))
            .map(|item| (item.key().id.clone(), item.value().value.clone()))
            .collect())
    }

    async fn index_expiry(&self, key: &StateKey, expires_at_ms: i64) -> Result<(), StateError> {
        self.expiry.insert(key.clone(), expires_at_ms);
        Ok(())
    }

    async fn remove_expiry_index(&self, key: &StateKey) -> Result<(), StateError> {
        self.expiry.remove(key);
        Ok(())
    }

    async fn get_expired(
        &self,
        kind: KeyKind,
        now_ms: i64,
    ) -> Result<Vec<StateKey>, StateError> {
        Ok(self
            .expiry
            .iter()
            .filter(|item| item.key().kind == kind && *item.value() <= now_ms)
            .map(|item| item.key().clone())
            .collect())
    }
}
