use serde::Deserialize;

use medidoc_core::MappingKind;

/// Where doctor and hospital mappings to patients are looked up.
#[derive(Debug, Deserialize)]
pub struct RelationshipsConfig {
    /// `"static"` (mappings listed below) or `"http"` (remote service).
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Deadline for a single lookup, in milliseconds. Lookups that exceed it
    /// are treated as unmapped.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Base URL of the relationship service for the `http` backend.
    pub url: Option<String>,

    /// Inline mappings for the `static` backend.
    #[serde(default)]
    pub mappings: Vec<MappingEntry>,
}

/// One active mapping between an actor and a patient.
#[derive(Debug, Clone, Deserialize)]
pub struct MappingEntry {
    pub kind: MappingKind,
    pub actor_id: String,
    pub patient_id: String,
}

impl Default for RelationshipsConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            timeout_ms: default_timeout_ms(),
            url: None,
            mappings: Vec::new(),
        }
    }
}

fn default_backend() -> String {
    "static".to_owned()
}

fn default_timeout_ms() -> u64 {
    2_000
}
