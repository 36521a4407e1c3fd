use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::actor::ActorRole;
use crate::types::{ActorId, DocumentId, StorageKey};

/// The kind of record a document was uploaded for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum ContextKind {
    CaseHistory,
    Report,
    MessageAttachment,
    Other,
}

impl ContextKind {
    /// Whether documents of this kind belong to a patient record.
    pub fn is_patient_record(self) -> bool {
        matches!(
            self,
            Self::CaseHistory | Self::Report | Self::MessageAttachment
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CaseHistory => "case_history",
            Self::Report => "report",
            Self::MessageAttachment => "message_attachment",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ContextKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a context tag is not recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownContextKind(pub String);

impl fmt::Display for UnknownContextKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown context kind: {}", self.0)
    }
}

impl std::error::Error for UnknownContextKind {}

impl FromStr for ContextKind {
    type Err = UnknownContextKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "case_history" => Ok(Self::CaseHistory),
            "report" => Ok(Self::Report),
            "message_attachment" => Ok(Self::MessageAttachment),
            "other" => Ok(Self::Other),
            other => Err(UnknownContextKind(other.to_owned())),
        }
    }
}

/// Describes the record a document is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct OwnerContext {
    pub kind: ContextKind,
    /// Identifier of the case history, report or chat message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_id: Option<String>,
    /// The patient whose record this is, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>))]
    pub patient_id: Option<ActorId>,
}

impl OwnerContext {
    pub fn new(kind: ContextKind) -> Self {
        Self {
            kind,
            ref_id: None,
            patient_id: None,
        }
    }

    #[must_use]
    pub fn with_ref_id(mut self, ref_id: impl Into<String>) -> Self {
        self.ref_id = Some(ref_id.into());
        self
    }

    #[must_use]
    pub fn with_patient(mut self, patient_id: impl Into<ActorId>) -> Self {
        self.patient_id = Some(patient_id.into());
        self
    }

    /// The patient this context grants relationship-based access to, if any.
    pub fn patient_record(&self) -> Option<&ActorId> {
        if self.kind.is_patient_record() {
            self.patient_id.as_ref()
        } else {
            None
        }
    }
}

/// A stored file plus its immutable metadata.
///
/// `storage_key` resolves to exactly `size_bytes` bytes in the blob store.
/// Documents are never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub owner_actor_id: ActorId,
    pub uploaded_by_role: ActorRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_context: Option<OwnerContext>,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remark: Option<String>,
    pub storage_key: StorageKey,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_kind_round_trips_through_str() {
        for kind in [
            ContextKind::CaseHistory,
            ContextKind::Report,
            ContextKind::MessageAttachment,
            ContextKind::Other,
        ] {
            assert_eq!(kind.as_str().parse::<ContextKind>().unwrap(), kind);
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{kind}\""));
        }
        assert!("lab".parse::<ContextKind>().is_err());
    }

    #[test]
    fn other_context_is_not_a_patient_record() {
        let ctx = OwnerContext::new(ContextKind::Other).with_patient("p-1");
        assert!(ctx.patient_record().is_none());

        let ctx = OwnerContext::new(ContextKind::Report).with_patient("p-1");
        assert_eq!(ctx.patient_record().map(ActorId::as_str), Some("p-1"));
    }

    #[test]
    fn document_serde_omits_empty_optionals() {
        let doc = Document {
            id: DocumentId::new("d-1"),
            owner_actor_id: ActorId::new("a-1"),
            uploaded_by_role: ActorRole::Patient,
            owner_context: None,
            file_name: "scan.pdf".into(),
            content_type: "application/pdf".into(),
            size_bytes: 3,
            remark: None,
            storage_key: StorageKey::new("k-1"),
            created_at: Utc::now(),
        };
        let value = serde_json::to_value(&doc).unwrap();
        assert!(value.get("remark").is_none());
        assert!(value.get("owner_context").is_none());
        let back: Document = serde_json::from_value(value).unwrap();
        assert_eq!(back, doc);
    }
}
