use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::ActorId;

/// The kind of principal making a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum ActorRole {
    Administrator,
    Hospital,
    Doctor,
    Patient,
}

impl ActorRole {
    /// Parse a role from a string, accepting `admin` as an alias.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "administrator" | "admin" => Some(Self::Administrator),
            "hospital" => Some(Self::Hospital),
            "doctor" => Some(Self::Doctor),
            "patient" => Some(Self::Patient),
            _ => None,
        }
    }

    /// The mapping kind an actor of this role can hold towards a patient.
    pub fn mapping_kind(self) -> Option<MappingKind> {
        match self {
            Self::Doctor => Some(MappingKind::Doctor),
            Self::Hospital => Some(MappingKind::Hospital),
            Self::Administrator | Self::Patient => None,
        }
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Administrator => write!(f, "administrator"),
            Self::Hospital => write!(f, "hospital"),
            Self::Doctor => write!(f, "doctor"),
            Self::Patient => write!(f, "patient"),
        }
    }
}

/// Which side of a care relationship is mapped to a patient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingKind {
    /// A doctor treating the patient.
    Doctor,
    /// The hospital the patient is registered with.
    Hospital,
}

impl fmt::Display for MappingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Doctor => write!(f, "doctor"),
            Self::Hospital => write!(f, "hospital"),
        }
    }
}

/// Answer obtained from the relationship collaborator for one lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipStatus {
    /// An active mapping exists.
    Mapped,
    /// The collaborator answered that no mapping exists.
    NotMapped,
    /// The collaborator failed or timed out.
    Unknown,
}

/// A single relationship fact between the acting principal and a patient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipFact {
    pub kind: MappingKind,
    pub patient_id: ActorId,
    pub status: RelationshipStatus,
}

/// Per-request authorization input: who is acting, and what is known about
/// their relationships.
///
/// Never persisted. Built by the transport layer from a validated session and
/// enriched with relationship facts before policy evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessContext {
    pub actor_id: ActorId,
    pub role: ActorRole,
    pub facts: Vec<RelationshipFact>,
}

impl AccessContext {
    /// Create a context without any relationship facts.
    pub fn new(actor_id: impl Into<ActorId>, role: ActorRole) -> Self {
        Self {
            actor_id: actor_id.into(),
            role,
            facts: Vec::new(),
        }
    }

    /// Attach a relationship fact.
    #[must_use]
    pub fn with_fact(
        mut self,
        kind: MappingKind,
        patient_id: impl Into<ActorId>,
        status: RelationshipStatus,
    ) -> Self {
        self.facts.push(RelationshipFact {
            kind,
            patient_id: patient_id.into(),
            status,
        });
        self
    }

    pub fn is_administrator(&self) -> bool {
        self.role == ActorRole::Administrator
    }

    /// Combine every fact recorded for `(kind, patient_id)` into one status.
    ///
    /// No facts, or facts that disagree, yield [`RelationshipStatus::Unknown`].
    pub fn relationship(&self, kind: MappingKind, patient_id: &ActorId) -> RelationshipStatus {
        let mut combined: Option<RelationshipStatus> = None;
        for fact in self
            .facts
            .iter()
            .filter(|f| f.kind == kind && &f.patient_id == patient_id)
        {
            combined = match combined {
                None => Some(fact.status),
                Some(prev) if prev == fact.status => Some(prev),
                Some(_) => return RelationshipStatus::Unknown,
            };
        }
        combined.unwrap_or(RelationshipStatus::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parsing_accepts_aliases() {
        assert_eq!(ActorRole::from_str_loose("admin"), Some(ActorRole::Administrator));
        assert_eq!(ActorRole::from_str_loose("Doctor"), Some(ActorRole::Doctor));
        assert_eq!(ActorRole::from_str_loose("HOSPITAL"), Some(ActorRole::Hospital));
        assert_eq!(ActorRole::from_str_loose("nurse"), None);
    }

    #[test]
    fn role_display_matches_serde() {
        let json = serde_json::to_string(&ActorRole::Administrator).unwrap();
        assert_eq!(json, format!("\"{}\"", ActorRole::Administrator));
    }

    #[test]
    fn relationship_without_facts_is_unknown() {
        let ctx = AccessContext::new("doc-1", ActorRole::Doctor);
        assert_eq!(
            ctx.relationship(MappingKind::Doctor, &ActorId::new("p-1")),
            RelationshipStatus::Unknown
        );
    }

    #[test]
    fn conflicting_facts_are_unknown() {
        let ctx = AccessContext::new("doc-1", ActorRole::Doctor)
            .with_fact(MappingKind::Doctor, "p-1", RelationshipStatus::Mapped)
            .with_fact(MappingKind::Doctor, "p-1", RelationshipStatus::NotMapped);
        assert_eq!(
            ctx.relationship(MappingKind::Doctor, &ActorId::new("p-1")),
            RelationshipStatus::Unknown
        );
    }

    #[test]
    fn facts_are_scoped_by_patient_and_kind() {
        let ctx = AccessContext::new("h-1", ActorRole::Hospital)
            .with_fact(MappingKind::Hospital, "p-1", RelationshipStatus::Mapped);
        assert_eq!(
            ctx.relationship(MappingKind::Hospital, &ActorId::new("p-1")),
            RelationshipStatus::Mapped
        );
        assert_eq!(
            ctx.relationship(MappingKind::Doctor, &ActorId::new("p-1")),
            RelationshipStatus::Unknown
        );
        assert_eq!(
            ctx.relationship(MappingKind::Hospital, &ActorId::new("p-2")),
            RelationshipStatus::Unknown
        );
    }
}
