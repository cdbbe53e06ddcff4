//! Reference Validator
//!
//! Turns an envelope's declared references into verdicts: an Error for each
//! reference that did not resolve, a Pass for each one that did (or the
//! requirement validator's errors when the DataType constrains the target),
//! and an Error per duplicated target within one field.

use std::collections::BTreeMap;

use uuid::Uuid;

use crate::data_type::DataType;
use crate::envelope::ValidationEnvelope;
use crate::error::Result;
use crate::reference::Reference;
use crate::requirement_validator::ReferenceRequirementValidator;
use crate::submittable::{ReferenceField, Submittable};
use crate::validation_result::{SingleValidationResult, ValidationAuthor};

pub struct ReferenceValidator {
    requirements: ReferenceRequirementValidator,
}

impl ReferenceValidator {
    pub fn new(requirements: ReferenceRequirementValidator) -> Self {
        Self { requirements }
    }

    /// Verdicts for every reference field of the envelope's entity.
    pub async fn validate(
        &self,
        envelope: &ValidationEnvelope,
        data_type: Option<&DataType>,
    ) -> Result<Vec<SingleValidationResult>> {
        let entity_uuid = envelope.entity_uuid();
        let mut results = Vec::new();

        for field in envelope.entity.links.reference_fields() {
            let candidates = envelope.resolved.get(field.target);
            let mut targets: Vec<&Submittable> = Vec::with_capacity(field.references.len());

            for reference in &field.references {
                match candidates.iter().find(|c| c.answers_to(reference)) {
                    Some(target) => {
                        let layered = match data_type {
                            Some(data_type) => {
                                self.requirements
                                    .validate(entity_uuid, data_type, target)
                                    .await?
                            }
                            None => Vec::new(),
                        };
                        if layered.is_empty() {
                            results.push(SingleValidationResult::pass(
                                ValidationAuthor::Core,
                                entity_uuid,
                            ));
                        } else {
                            results.extend(layered);
                        }
                        targets.push(target);
                    }
                    None => results.push(unresolved(entity_uuid, &field, reference)),
                }
            }

            results.extend(duplicates(entity_uuid, &field, &targets));
        }

        Ok(results)
    }
}

fn unresolved(entity_uuid: Uuid, field: &ReferenceField<'_>, reference: &Reference) -> SingleValidationResult {
    SingleValidationResult::error(
        ValidationAuthor::Core,
        entity_uuid,
        format!(
            "Could not find the {} referenced by {} in {}",
            field.target, reference, field.name
        ),
    )
}

/// One Error per target reached more than once through the same field.
fn duplicates(
    entity_uuid: Uuid,
    field: &ReferenceField<'_>,
    targets: &[&Submittable],
) -> Vec<SingleValidationResult> {
    let mut by_accession: BTreeMap<&str, usize> = BTreeMap::new();
    let mut by_alias: BTreeMap<(&str, &str), usize> = BTreeMap::new();

    for target in targets {
        match (target.accession.as_deref(), target.alias.as_deref(), target.team.as_deref()) {
            (Some(accession), _, _) if !accession.is_empty() => {
                *by_accession.entry(accession).or_default() += 1;
            }
            (_, Some(alias), Some(team)) => {
                *by_alias.entry((alias, team)).or_default() += 1;
            }
            _ => {}
        }
    }

    let accession_errors = by_accession
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(accession, _)| {
            SingleValidationResult::error(
                ValidationAuthor::Core,
                entity_uuid,
                format!(
                    "{} references {} accession {} more than once",
                    field.name, field.target, accession
                ),
            )
        });
    let alias_errors = by_alias
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|((alias, team), _)| {
            SingleValidationResult::error(
                ValidationAuthor::Core,
                entity_uuid,
                format!(
                    "{} references {} alias {} in team {} more than once",
                    field.name, field.target, alias, team
                ),
            )
        });

    accession_errors.chain(alias_errors).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::RoundTicket;
    use crate::catalog::ReferenceDataCatalog;
    use crate::memory::{InMemorySubmittables, InMemoryValidationResultStore};
    use crate::requirement_validator::WaitPolicy;
    use crate::resolver::EnvelopeExpander;
    use crate::submittable::{SubmittableKind, SubmittableLinks};
    use crate::validation_result::ValidationStatus;
    use std::sync::Arc;

    fn reference_validator() -> ReferenceValidator {
        ReferenceValidator::new(ReferenceRequirementValidator::new(
            Arc::new(InMemoryValidationResultStore::new()),
            Arc::new(ReferenceDataCatalog::default()),
            WaitPolicy::default(),
        ))
    }

    async fn envelope_for(store: &InMemorySubmittables, entity: &Submittable) -> ValidationEnvelope {
        EnvelopeExpander::new(Arc::new(store.registry()))
            .expand(
                entity,
                &RoundTicket {
                    uuid: Uuid::new_v4(),
                    version: 1,
                },
                None,
                None,
            )
            .await
            .unwrap()
    }

    fn assay_with(study_ref: Option<Reference>, sample_uses: Vec<Reference>) -> Submittable {
        Submittable::draft(SubmittableKind::Assay, "T", "a1", "sub-1").with_links(SubmittableLinks::Assay {
            study_ref,
            sample_uses: sample_uses
                .into_iter()
                .map(|reference| crate::submittable::SampleUse {
                    reference,
                    role: None,
                })
                .collect(),
            protocol_uses: Vec::new(),
        })
    }

    #[tokio::test]
    async fn test_resolved_study_passes() {
        let store = InMemorySubmittables::new();
        let study = Submittable::draft(SubmittableKind::Study, "T", "st", "sub-9").with_accession("ST1");
        store.save(study.clone()).await;

        let assay = assay_with(Some(Reference::by_accession("ST1")), Vec::new());
        let envelope = envelope_for(&store, &assay).await;
        assert_eq!(envelope.study().map(|s| s.id), Some(study.id));

        let results = reference_validator().validate(&envelope, None).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, ValidationStatus::Pass);
    }

    #[tokio::test]
    async fn test_unresolved_reference_names_the_alias() {
        let store = InMemorySubmittables::new();
        let assay = assay_with(None, vec![Reference::by_alias("TeamX", "ghost")]);
        let envelope = envelope_for(&store, &assay).await;

        let results = reference_validator().validate(&envelope, None).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_error());
        let message = results[0].message.as_deref().unwrap();
        assert!(message.contains("ghost"));
        assert!(message.contains("TeamX"));
    }

    #[tokio::test]
    async fn test_duplicate_accession_is_reported_once() {
        let store = InMemorySubmittables::new();
        store
            .save(Submittable::draft(SubmittableKind::Sample, "T", "s1", "sub-1").with_accession("SAM1"))
            .await;

        let assay = assay_with(
            None,
            vec![
                Reference::by_accession("SAM1"),
                Reference::by_accession("SAM1"),
                Reference::by_accession("SAM1"),
            ],
        );
        let envelope = envelope_for(&store, &assay).await;
        let results = reference_validator().validate(&envelope, None).await.unwrap();

        let errors: Vec<_> = results.iter().filter(|r| r.is_error()).collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.as_deref().unwrap().contains("SAM1"));
    }

    #[tokio::test]
    async fn test_duplicate_alias_cites_alias_and_team() {
        let store = InMemorySubmittables::new();
        store
            .save(Submittable::draft(SubmittableKind::Sample, "TeamX", "s1", "sub-1"))
            .await;

        let assay = assay_with(
            None,
            vec![Reference::by_alias("TeamX", "s1"), Reference::by_alias("TeamX", "s1")],
        );
        let envelope = envelope_for(&store, &assay).await;
        let results = reference_validator().validate(&envelope, None).await.unwrap();

        let errors: Vec<_> = results.iter().filter(|r| r.is_error()).collect();
        assert_eq!(errors.len(), 1);
        let message = errors[0].message.as_deref().unwrap();
        assert!(message.contains("s1") && message.contains("TeamX"));
    }
}
