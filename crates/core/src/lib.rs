pub mod actor;
pub mod clock;
pub mod document;
pub mod token;
pub mod types;

pub use actor::{AccessContext, ActorRole, MappingKind, RelationshipFact, RelationshipStatus};
pub use clock::{Clock, ManualClock, SystemClock};
pub use document::{ContextKind, Document, OwnerContext, UnknownContextKind};
pub use token::{DownloadToken, IssuedToken};
pub use types::{ActorId, DocumentId, StorageKey};
