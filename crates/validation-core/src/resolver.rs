//! Reference resolution and envelope expansion
//!
//! One generic resolver handles every kind: accession first, otherwise the
//! newest (team, alias) match. A candidate is visible to the entity under
//! validation only if it is accessioned or belongs to the same submission.
//! Unresolved references are omitted; the reference validator reports them.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::aggregator::RoundTicket;
use crate::envelope::{ResolvedReferences, ValidationEnvelope};
use crate::error::Result;
use crate::ports::{ReferenceLookup, SubmittableRegistry};
use crate::reference::{Reference, ReferenceKey};
use crate::submittable::{Submittable, SubmittableKind};

/// Resolves references of one kind through a lookup capability
pub struct ReferenceResolver<'a, L: ReferenceLookup + ?Sized> {
    lookup: &'a L,
}

impl<'a, L: ReferenceLookup + ?Sized> ReferenceResolver<'a, L> {
    pub fn new(lookup: &'a L) -> Self {
        Self { lookup }
    }

    pub async fn resolve(
        &self,
        reference: &Reference,
        submission_id: &str,
    ) -> anyhow::Result<Option<Submittable>> {
        let candidates = match reference.key() {
            Some(ReferenceKey::Accession(accession)) => self
                .lookup
                .find_by_accession(&accession)
                .await?
                .into_iter()
                .collect(),
            Some(ReferenceKey::TeamAlias { team, alias }) => {
                self.lookup.find_by_team_and_alias(&team, &alias).await?
            }
            None => Vec::new(),
        };

        Ok(candidates
            .into_iter()
            .find(|candidate| is_visible_from(candidate, submission_id)))
    }
}

/// Accessioned records are global; drafts are only visible inside their own submission.
pub fn is_visible_from(candidate: &Submittable, submission_id: &str) -> bool {
    candidate.is_accessioned() || candidate.submission_id == submission_id
}

/// Builds validation envelopes by resolving every reference field of an entity
#[derive(Clone)]
pub struct EnvelopeExpander {
    registry: Arc<SubmittableRegistry>,
}

impl EnvelopeExpander {
    pub fn new(registry: Arc<SubmittableRegistry>) -> Self {
        Self { registry }
    }

    pub async fn expand(
        &self,
        entity: &Submittable,
        ticket: &RoundTicket,
        data_type_id: Option<String>,
        checklist_id: Option<String>,
    ) -> Result<ValidationEnvelope> {
        let resolved = self.resolve_references(entity).await?;
        Ok(ValidationEnvelope {
            validation_result_uuid: ticket.uuid,
            version: ticket.version,
            submission_id: entity.submission_id.clone(),
            data_type_id,
            checklist_id,
            entity: entity.clone(),
            resolved,
        })
    }

    pub async fn resolve_references(&self, entity: &Submittable) -> Result<ResolvedReferences> {
        let mut resolved = ResolvedReferences::default();

        for field in entity.links.reference_fields() {
            if field.references.is_empty() {
                continue;
            }
            let repository = self.registry.get(field.target)?;
            let resolver = ReferenceResolver::new(repository.as_ref());
            for reference in field.references {
                match resolver.resolve(reference, &entity.submission_id).await? {
                    Some(target) => resolved.insert(target),
                    None => debug!(
                        entity_uuid = %entity.id,
                        field = field.name,
                        reference = %reference,
                        "Reference not resolved"
                    ),
                }
            }
        }

        if entity.kind() == SubmittableKind::AssayData {
            self.pull_assay_protocols(entity, &mut resolved).await?;
        }

        Ok(resolved)
    }

    /// Assay data inherits the protocols used by each of its assays.
    async fn pull_assay_protocols(
        &self,
        entity: &Submittable,
        resolved: &mut ResolvedReferences,
    ) -> Result<()> {
        let mut seen = HashSet::new();
        let protocol_uses: Vec<Reference> = resolved
            .get(SubmittableKind::Assay)
            .iter()
            .flat_map(|assay| assay.links.protocol_uses().iter())
            .filter(|r| seen.insert(dedup_key(r)))
            .cloned()
            .collect();

        if protocol_uses.is_empty() {
            return Ok(());
        }

        let repository = self.registry.get(SubmittableKind::Protocol)?;
        let resolver = ReferenceResolver::new(repository.as_ref());
        for reference in &protocol_uses {
            if let Some(protocol) = resolver.resolve(reference, &entity.submission_id).await? {
                resolved.insert(protocol);
            }
        }
        Ok(())
    }
}

/// Case-insensitive identity of a protocol use.
fn dedup_key(reference: &Reference) -> (String, String) {
    match reference.key() {
        Some(ReferenceKey::Accession(accession)) => ("#".to_string(), accession.to_lowercase()),
        Some(ReferenceKey::TeamAlias { team, alias }) => (alias.to_lowercase(), team.to_lowercase()),
        None => (String::new(), String::new()),
    }
}
