pub mod builder;
pub mod catalog;
pub mod error;
pub mod metrics;
pub mod policy;
pub mod reaper;
pub mod relationship;
pub mod tokens;
pub mod vault;

pub use builder::{DEFAULT_MAX_UPLOAD_BYTES, VaultBuilder};
pub use catalog::{CatalogStats, DocumentCatalog, NewDocument};
pub use error::VaultError;
pub use metrics::{MetricsSnapshot, VaultMetrics};
pub use policy::{ReadDecision, can_read, can_write, evaluate_read};
pub use reaper::TokenReaper;
pub use relationship::{RelationshipError, RelationshipResolver, StaticRelationships};
pub use tokens::{TokenManager, TokenSettings, token_digest, token_fingerprint};
pub use vault::{
    DEFAULT_CONTENT_TYPE, Retrieved, Upload, Vault, content_disposition, infer_content_type,
};
