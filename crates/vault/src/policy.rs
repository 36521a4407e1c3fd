//! Access policy evaluation.
//!
//! Every function here is pure: the outcome depends only on the
//! [`AccessContext`] and the document metadata passed in. Relationship facts
//! must be resolved beforehand; a missing or ambiguous fact denies.

use medidoc_core::{
    AccessContext, ActorId, ActorRole, Document, MappingKind, OwnerContext, RelationshipStatus,
};

/// Why a read was allowed or denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadDecision {
    Administrator,
    Owner,
    /// The actor is the patient whose record the document belongs to.
    SubjectPatient,
    /// The actor holds an active mapping to the document's patient.
    Mapped(MappingKind),
    Denied,
}

impl ReadDecision {
    pub fn is_allowed(self) -> bool {
        !matches!(self, Self::Denied)
    }
}

/// The patient a document is about, if any.
///
/// This is the patient named by a patient-record context, or the uploader
/// when a patient uploaded the document themself.
pub fn subject_patient(document: &Document) -> Option<&ActorId> {
    document
        .owner_context
        .as_ref()
        .and_then(OwnerContext::patient_record)
        .or_else(|| {
            (document.uploaded_by_role == ActorRole::Patient).then_some(&document.owner_actor_id)
        })
}

/// Decide whether `ctx` may read `document`, with the reason.
pub fn evaluate_read(ctx: &AccessContext, document: &Document) -> ReadDecision {
    if ctx.is_administrator() {
        return ReadDecision::Administrator;
    }
    if document.owner_actor_id == ctx.actor_id {
        return ReadDecision::Owner;
    }

    let Some(patient) = subject_patient(document) else {
        return ReadDecision::Denied;
    };

    if ctx.role == ActorRole::Patient {
        return if &ctx.actor_id == patient {
            ReadDecision::SubjectPatient
        } else {
            ReadDecision::Denied
        };
    }

    match ctx.role.mapping_kind() {
        Some(kind) if ctx.relationship(kind, patient) == RelationshipStatus::Mapped => {
            ReadDecision::Mapped(kind)
        }
        _ => ReadDecision::Denied,
    }
}

/// Whether `ctx` may read `document`.
pub fn can_read(ctx: &AccessContext, document: &Document) -> bool {
    evaluate_read(ctx, document).is_allowed()
}

/// Whether `ctx` may create a document under `owner_context`.
///
/// Uploads are not restricted by relationship; the uploader always becomes
/// the owner. Only an anonymous context is refused.
pub fn can_write(ctx: &AccessContext, owner_context: Option<&OwnerContext>) -> bool {
    let _ = owner_context;
    !ctx.actor_id.as_str().trim().is_empty()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use medidoc_core::{ContextKind, DocumentId, StorageKey};

    use super::*;

    fn document(owner: &str, role: ActorRole, context: Option<OwnerContext>) -> Document {
        Document {
            id: DocumentId::new("doc-1"),
            owner_actor_id: ActorId::new(owner),
            uploaded_by_role: role,
            owner_context: context,
            file_name: "notes.txt".into(),
            content_type: "text/plain".into(),
            size_bytes: 10,
            remark: None,
            storage_key: StorageKey::new("k"),
            created_at: Utc::now(),
        }
    }

    fn case_history_for(patient: &str) -> Option<OwnerContext> {
        Some(
            OwnerContext::new(ContextKind::CaseHistory)
                .with_ref_id("ch-1")
                .with_patient(patient),
        )
    }

    #[test]
    fn administrator_reads_anything() {
        let doc = document("someone", ActorRole::Doctor, None);
        let ctx = AccessContext::new("admin-1", ActorRole::Administrator);
        assert_eq!(evaluate_read(&ctx, &doc), ReadDecision::Administrator);
    }

    #[test]
    fn owner_reads_own_upload() {
        let doc = document("doc-a", ActorRole::Doctor, None);
        let ctx = AccessContext::new("doc-a", ActorRole::Doctor);
        assert_eq!(evaluate_read(&ctx, &doc), ReadDecision::Owner);
    }

    #[test]
    fn patient_reads_own_record() {
        let doc = document("admin-1", ActorRole::Administrator, case_history_for("p-1"));
        let ctx = AccessContext::new("p-1", ActorRole::Patient);
        assert_eq!(evaluate_read(&ctx, &doc), ReadDecision::SubjectPatient);

        let other = AccessContext::new("p-2", ActorRole::Patient);
        assert!(!can_read(&other, &doc));
    }

    #[test]
    fn mapped_doctor_reads_patient_record() {
        let doc = document("admin-1", ActorRole::Administrator, case_history_for("p-1"));
        let ctx = AccessContext::new("d-1", ActorRole::Doctor).with_fact(
            MappingKind::Doctor,
            "p-1",
            RelationshipStatus::Mapped,
        );
        assert_eq!(
            evaluate_read(&ctx, &doc),
            ReadDecision::Mapped(MappingKind::Doctor)
        );
    }

    #[test]
    fn mapped_hospital_reads_patient_record() {
        let doc = document("d-1", ActorRole::Doctor, case_history_for("p-1"));
        let ctx = AccessContext::new("h-1", ActorRole::Hospital).with_fact(
            MappingKind::Hospital,
            "p-1",
            RelationshipStatus::Mapped,
        );
        assert!(can_read(&ctx, &doc));
    }

    #[test]
    fn hospital_fact_does_not_grant_doctor_access() {
        let doc = document("d-1", ActorRole::Doctor, case_history_for("p-1"));
        let ctx = AccessContext::new("d-2", ActorRole::Doctor).with_fact(
            MappingKind::Hospital,
            "p-1",
            RelationshipStatus::Mapped,
        );
        assert!(!can_read(&ctx, &doc));
    }

    #[test]
    fn unmapped_or_unknown_doctor_is_denied() {
        let doc = document("admin-1", ActorRole::Administrator, case_history_for("p-1"));
        for status in [RelationshipStatus::NotMapped, RelationshipStatus::Unknown] {
            let ctx = AccessContext::new("d-1", ActorRole::Doctor).with_fact(
                MappingKind::Doctor,
                "p-1",
                status,
            );
            assert!(!can_read(&ctx, &doc), "{status:?} must deny");
        }
        let no_facts = AccessContext::new("d-1", ActorRole::Doctor);
        assert!(!can_read(&no_facts, &doc));
    }

    #[test]
    fn ambiguous_facts_deny() {
        let doc = document("admin-1", ActorRole::Administrator, case_history_for("p-1"));
        let ctx = AccessContext::new("d-1", ActorRole::Doctor)
            .with_fact(MappingKind::Doctor, "p-1", RelationshipStatus::Mapped)
            .with_fact(MappingKind::Doctor, "p-1", RelationshipStatus::Unknown);
        assert!(!can_read(&ctx, &doc));
    }

    #[test]
    fn other_context_grants_no_relationship_access() {
        let ctx_other = Some(OwnerContext::new(ContextKind::Other).with_patient("p-1"));
        let doc = document("d-1", ActorRole::Doctor, ctx_other);
        let ctx = AccessContext::new("d-2", ActorRole::Doctor).with_fact(
            MappingKind::Doctor,
            "p-1",
            RelationshipStatus::Mapped,
        );
        assert!(!can_read(&ctx, &doc));
        let patient = AccessContext::new("p-1", ActorRole::Patient);
        assert!(!can_read(&patient, &doc));
    }

    #[test]
    fn patient_upload_is_readable_by_their_doctor() {
        let doc = document("p-1", ActorRole::Patient, None);
        assert_eq!(subject_patient(&doc).map(ActorId::as_str), Some("p-1"));

        let mapped = AccessContext::new("d-1", ActorRole::Doctor).with_fact(
            MappingKind::Doctor,
            "p-1",
            RelationshipStatus::Mapped,
        );
        assert!(can_read(&mapped, &doc));

        let stranger = AccessContext::new("d-9", ActorRole::Doctor);
        assert!(!can_read(&stranger, &doc));
    }

    #[test]
    fn write_requires_an_actor() {
        let ctx = AccessContext::new("p-1", ActorRole::Patient);
        assert!(can_write(&ctx, None));
        assert!(can_write(&ctx, case_history_for("p-9").as_ref()));

        let anonymous = AccessContext::new("  ", ActorRole::Patient);
        assert!(!can_write(&anonymous, None));
    }
}
