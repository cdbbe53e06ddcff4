//! Reference Requirement Validator
//!
//! Enforces a DataType's RefRequirements on a resolved reference target:
//! the target must carry the required DataType, and every additional author
//! named by the requirement must have passed the target. When those authors
//! are still running, validation blocks on a bounded poll of the target's
//! ValidationResult; running out of budget is a fatal error, not a verdict.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::data_type::{DataType, RefRequirement};
use crate::error::{CoordinatorError, Result};
use crate::ports::{ReferenceDataStore, ValidationResultStore};
use crate::submittable::Submittable;
use crate::validation_result::{SingleValidationResult, ValidationAuthor, ValidationResult};

/// Poll schedule for waiting on a target's own validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl WaitPolicy {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Pause between reads; never zero, so a zero interval cannot spin.
    fn pause(&self) -> Duration {
        self.interval.max(Duration::from_millis(1))
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(3),
        }
    }
}

pub struct ReferenceRequirementValidator {
    results: Arc<dyn ValidationResultStore>,
    reference_data: Arc<dyn ReferenceDataStore>,
    policy: WaitPolicy,
}

impl ReferenceRequirementValidator {
    pub fn new(
        results: Arc<dyn ValidationResultStore>,
        reference_data: Arc<dyn ReferenceDataStore>,
        policy: WaitPolicy,
    ) -> Self {
        Self {
            results,
            reference_data,
            policy,
        }
    }

    pub fn policy(&self) -> WaitPolicy {
        self.policy
    }

    /// Check `target` against the requirement `data_type` declares for its kind.
    ///
    /// Returns no results when no requirement applies or when every check
    /// passes. Results are attributed to `entity_uuid`, the referencing entity.
    pub async fn validate(
        &self,
        entity_uuid: Uuid,
        data_type: &DataType,
        target: &Submittable,
    ) -> Result<Vec<SingleValidationResult>> {
        let Some(requirement) = data_type.requirement_for(target.kind()) else {
            return Ok(Vec::new());
        };

        if target.data_type_id.as_deref() != Some(requirement.data_type_id.as_str()) {
            let actual = self.data_type_label(target.data_type_id.as_deref()).await?;
            let required = self
                .data_type_label(Some(requirement.data_type_id.as_str()))
                .await?;
            return Ok(vec![SingleValidationResult::error(
                ValidationAuthor::Core,
                entity_uuid,
                format!(
                    "{} {} is a {} but a {} is required instead",
                    target.kind(),
                    target.label(),
                    actual,
                    required
                ),
            )]);
        }

        if requirement.additional_required_validation_authors.is_empty() {
            return Ok(Vec::new());
        }

        let settled = self.wait_for_authors(target, requirement).await?;
        Ok(requirement
            .additional_required_validation_authors
            .iter()
            .filter(|author| settled.has_error_from(**author))
            .map(|author| {
                SingleValidationResult::error(
                    ValidationAuthor::Core,
                    entity_uuid,
                    format!(
                        "{} {} must pass the {} validation standard before it can be referenced here",
                        target.kind(),
                        target.label(),
                        author
                    ),
                )
            })
            .collect())
    }

    /// Poll the target's ValidationResult until every required author has
    /// answered. The last read happens at the deadline itself.
    async fn wait_for_authors(
        &self,
        target: &Submittable,
        requirement: &RefRequirement,
    ) -> Result<ValidationResult> {
        let authors = &requirement.additional_required_validation_authors;
        let started = Instant::now();
        let deadline = started + self.policy.timeout;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let current = self
                .results
                .find_by_entity_uuid(target.id)
                .await?
                .ok_or(CoordinatorError::ValidationResultNotFound(target.id))?;

            if current.has_answers_from(authors) {
                return Ok(current);
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            debug!(
                target_uuid = %target.id,
                attempt,
                remaining_ms = (deadline - now).as_millis() as u64,
                authors = ?authors,
                "Waiting for referenced entity validation"
            );
            tokio::time::sleep(self.policy.pause().min(deadline - now)).await;
        }

        let waited_ms = started.elapsed().as_millis() as u64;
        let authors = authors
            .iter()
            .map(ValidationAuthor::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        warn!(
            target_uuid = %target.id,
            authors = %authors,
            attempts = attempt,
            waited_ms,
            "Referenced entity did not settle in time"
        );
        Err(CoordinatorError::ReferenceWaitTimeout {
            target_uuid: target.id,
            authors,
            waited_ms,
        })
    }

    /// Display name of a data type, falling back to its id.
    async fn data_type_label(&self, id: Option<&str>) -> Result<String> {
        let Some(id) = id else {
            return Ok("submittable without a data type".to_string());
        };
        Ok(self
            .reference_data
            .find_data_type(id)
            .await?
            .map(|dt| dt.display_name)
            .unwrap_or_else(|| id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ReferenceDataCatalog;
    use crate::data_type::RefRequirement;
    use crate::memory::InMemoryValidationResultStore;
    use crate::submittable::SubmittableKind;

    fn study_type(id: &str, name: &str) -> DataType {
        DataType {
            id: id.into(),
            display_name: name.into(),
            submittable_kind: SubmittableKind::Study,
            required_validation_authors: vec![ValidationAuthor::Core],
            optional_validation_authors: Vec::new(),
            ref_requirements: Vec::new(),
        }
    }

    fn assay_type(extra: Vec<ValidationAuthor>) -> DataType {
        DataType {
            id: "ena-assay".into(),
            display_name: "ENA assay".into(),
            submittable_kind: SubmittableKind::Assay,
            required_validation_authors: vec![ValidationAuthor::Core],
            optional_validation_authors: Vec::new(),
            ref_requirements: vec![RefRequirement {
                ref_type: SubmittableKind::Study,
                data_type_id: "ena-study".into(),
                additional_required_validation_authors: extra,
            }],
        }
    }

    fn validator(store: Arc<InMemoryValidationResultStore>) -> ReferenceRequirementValidator {
        let catalog = ReferenceDataCatalog::new(
            vec![
                study_type("ena-study", "ENA study"),
                study_type("ml-study", "Metabolights study"),
            ],
            Vec::new(),
        );
        ReferenceRequirementValidator::new(store, Arc::new(catalog), WaitPolicy::default())
    }

    #[tokio::test]
    async fn test_no_requirement_for_kind_yields_nothing() {
        let store = Arc::new(InMemoryValidationResultStore::new());
        let sample = Submittable::draft(SubmittableKind::Sample, "T", "s1", "sub-1");
        let results = validator(store)
            .validate(Uuid::new_v4(), &assay_type(Vec::new()), &sample)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_wrong_data_type_is_single_error_naming_both() {
        let store = Arc::new(InMemoryValidationResultStore::new());
        let study =
            Submittable::draft(SubmittableKind::Study, "T", "st1", "sub-1").with_data_type("ml-study");

        let results = validator(store)
            .validate(Uuid::new_v4(), &assay_type(vec![ValidationAuthor::Ena]), &study)
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(
            results[0].message.as_deref(),
            Some("Study st1 is a Metabolights study but a ENA study is required instead")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_pending_author_then_passes() {
        let store = Arc::new(InMemoryValidationResultStore::new());
        let study =
            Submittable::draft(SubmittableKind::Study, "T", "st1", "sub-1").with_data_type("ena-study");
        store
            .insert(&ValidationResult::new(study.id, "sub-1"))
            .await
            .unwrap();
        store
            .open_round(study.id, &[ValidationAuthor::Ena])
            .await
            .unwrap();

        let writer = Arc::clone(&store);
        let study_id = study.id;
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            writer
                .merge_author_results(
                    study_id,
                    Some(1),
                    ValidationAuthor::Ena,
                    &[SingleValidationResult::pass(ValidationAuthor::Ena, study_id)],
                )
                .await
                .unwrap();
        });

        let results = validator(store)
            .validate(Uuid::new_v4(), &assay_type(vec![ValidationAuthor::Ena]), &study)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_author_on_target_is_reported() {
        let store = Arc::new(InMemoryValidationResultStore::new());
        let study =
            Submittable::draft(SubmittableKind::Study, "T", "st1", "sub-1").with_data_type("ena-study");
        store
            .insert(&ValidationResult::new(study.id, "sub-1"))
            .await
            .unwrap();
        store
            .open_round(study.id, &[ValidationAuthor::Ena])
            .await
            .unwrap();
        store
            .merge_author_results(
                study.id,
                Some(1),
                ValidationAuthor::Ena,
                &[SingleValidationResult::error(ValidationAuthor::Ena, study.id, "no title")],
            )
            .await
            .unwrap();

        let results = validator(store)
            .validate(Uuid::new_v4(), &assay_type(vec![ValidationAuthor::Ena]), &study)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(
            results[0].message.as_deref(),
            Some("Study st1 must pass the Ena validation standard before it can be referenced here")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_past_budget_is_fatal() {
        let store = Arc::new(InMemoryValidationResultStore::new());
        let study =
            Submittable::draft(SubmittableKind::Study, "T", "st1", "sub-1").with_data_type("ena-study");
        store
            .insert(&ValidationResult::new(study.id, "sub-1"))
            .await
            .unwrap();
        store
            .open_round(study.id, &[ValidationAuthor::Ena])
            .await
            .unwrap();

        let err = validator(store)
            .validate(Uuid::new_v4(), &assay_type(vec![ValidationAuthor::Ena]), &study)
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::ReferenceWaitTimeout { target_uuid, .. } if target_uuid == study.id));
        assert!(!err.is_retryable());
    }

    async fn pending_ena_study(store: &Arc<InMemoryValidationResultStore>) -> Submittable {
        let study =
            Submittable::draft(SubmittableKind::Study, "T", "st1", "sub-1").with_data_type("ena-study");
        store
            .insert(&ValidationResult::new(study.id, "sub-1"))
            .await
            .unwrap();
        store
            .open_round(study.id, &[ValidationAuthor::Ena])
            .await
            .unwrap();
        study
    }

    #[tokio::test(start_paused = true)]
    async fn test_answer_in_last_interval_before_deadline_is_seen() {
        let store = Arc::new(InMemoryValidationResultStore::new());
        let study = pending_ena_study(&store).await;

        let writer = Arc::clone(&store);
        let study_id = study.id;
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            writer
                .merge_author_results(
                    study_id,
                    Some(1),
                    ValidationAuthor::Ena,
                    &[SingleValidationResult::pass(ValidationAuthor::Ena, study_id)],
                )
                .await
                .unwrap();
        });

        let started = Instant::now();
        let results = validator(store)
            .validate(Uuid::new_v4(), &assay_type(vec![ValidationAuthor::Ena]), &study)
            .await
            .unwrap();
        assert!(results.is_empty());
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_reports_time_actually_waited() {
        let store = Arc::new(InMemoryValidationResultStore::new());
        let study = pending_ena_study(&store).await;
        let policy = WaitPolicy::new(Duration::from_millis(400), Duration::from_millis(1000));
        let validator = ReferenceRequirementValidator::new(
            store,
            Arc::new(ReferenceDataCatalog::default()),
            policy,
        );

        let started = Instant::now();
        let err = validator
            .validate(Uuid::new_v4(), &assay_type(vec![ValidationAuthor::Ena]), &study)
            .await
            .unwrap_err();

        assert_eq!(started.elapsed(), Duration::from_millis(1000));
        assert!(matches!(err, CoordinatorError::ReferenceWaitTimeout { waited_ms: 1000, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_reads_once() {
        let store = Arc::new(InMemoryValidationResultStore::new());
        let study = pending_ena_study(&store).await;
        let validator = ReferenceRequirementValidator::new(
            store,
            Arc::new(ReferenceDataCatalog::default()),
            WaitPolicy::new(Duration::from_secs(1), Duration::ZERO),
        );

        let err = validator
            .validate(Uuid::new_v4(), &assay_type(vec![ValidationAuthor::Ena]), &study)
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::ReferenceWaitTimeout { waited_ms: 0, .. }));
    }
}
