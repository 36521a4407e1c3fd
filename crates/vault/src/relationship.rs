use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use medidoc_core::{ActorId, MappingKind, RelationshipStatus};

/// Failure reported by a relationship collaborator.
#[derive(Debug, Error)]
pub enum RelationshipError {
    #[error("relationship lookup unavailable: {0}")]
    Unavailable(String),

    #[error("relationship lookup rejected: {0}")]
    Rejected(String),
}

/// Answers whether an actor holds an active mapping to a patient.
#[async_trait]
pub trait RelationshipResolver: Send + Sync {
    /// Returns `true` if `actor_id` is mapped to `patient_id` as `kind`.
    async fn is_mapped(
        &self,
        kind: MappingKind,
        actor_id: &ActorId,
        patient_id: &ActorId,
    ) -> Result<bool, RelationshipError>;
}

/// Look up one relationship under a deadline.
///
/// Errors and timeouts become [`RelationshipStatus::Unknown`], which the
/// access policy treats as a denial.
pub async fn lookup(
    resolver: &dyn RelationshipResolver,
    timeout: Duration,
    kind: MappingKind,
    actor_id: &ActorId,
    patient_id: &ActorId,
) -> RelationshipStatus {
    match tokio::time::timeout(timeout, resolver.is_mapped(kind, actor_id, patient_id)).await {
        Ok(Ok(true)) => RelationshipStatus::Mapped,
        Ok(Ok(false)) => RelationshipStatus::NotMapped,
        Ok(Err(e)) => {
            tracing::warn!(%kind, actor.id = %actor_id, patient.id = %patient_id, error = %e, "relationship lookup failed");
            RelationshipStatus::Unknown
        }
        Err(_) => {
            tracing::warn!(%kind, actor.id = %actor_id, patient.id = %patient_id, ?timeout, "relationship lookup timed out");
            RelationshipStatus::Unknown
        }
    }
}

/// A fixed set of mappings, loaded from configuration or built in tests.
#[derive(Debug, Clone, Default)]
pub struct StaticRelationships {
    mappings: HashSet<(MappingKind, ActorId, ActorId)>,
}

impl StaticRelationships {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `actor_id` is mapped to `patient_id` as `kind`.
    #[must_use]
    pub fn with_mapping(
        mut self,
        kind: MappingKind,
        actor_id: impl Into<ActorId>,
        patient_id: impl Into<ActorId>,
    ) -> Self {
        self.insert(kind, actor_id, patient_id);
        self
    }

    pub fn insert(
        &mut self,
        kind: MappingKind,
        actor_id: impl Into<ActorId>,
        patient_id: impl Into<ActorId>,
    ) {
        self.mappings
            .insert((kind, actor_id.into(), patient_id.into()));
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

#[async_trait]
impl RelationshipResolver for StaticRelationships {
    async fn is_mapped(
        &self,
        kind: MappingKind,
        actor_id: &ActorId,
        patient_id: &ActorId,
    ) -> Result<bool, RelationshipError> {
        Ok(self
            .mappings
            .contains(&(kind, actor_id.clone(), patient_id.clone())))
    }
}
