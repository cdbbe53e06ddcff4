//! End-to-end scenarios over the in-memory ports.

use std::sync::Arc;
use std::time::Duration;

use validation_core::memory::{InMemorySubmittables, InMemoryValidationResultStore, RecordingPublisher};
use validation_core::messages::{routing, AuthorResults, SubmittableChanged};
use validation_core::ports::ValidationResultStore;
use validation_core::submittable::{SampleUse, SubmittableLinks};
use validation_core::{
    AggregationOutcome, ChainedValidationService, CoreValidator, DataType, EnvelopeExpander,
    GlobalValidationStatus, RefRequirement, Reference, ReferenceDataCatalog,
    ReferenceRequirementValidator, ReferenceValidator, RoundTicket, SingleValidationResult,
    Submittable, SubmittableHandler, SubmittableKind, ValidationAuthor, ValidationEnvelope,
    ValidationResult, ValidationResultAggregator, ValidationStatus, WaitPolicy,
};

struct Harness {
    submittables: InMemorySubmittables,
    results: Arc<InMemoryValidationResultStore>,
    publisher: Arc<RecordingPublisher>,
    catalog: Arc<ReferenceDataCatalog>,
}

impl Harness {
    fn new(catalog: ReferenceDataCatalog) -> Self {
        Self {
            submittables: InMemorySubmittables::new(),
            results: Arc::new(InMemoryValidationResultStore::new()),
            publisher: Arc::new(RecordingPublisher::new()),
            catalog: Arc::new(catalog),
        }
    }

    /// Store the record and register its ValidationResult.
    async fn register(&self, submittable: &Submittable) {
        self.submittables.save(submittable.clone()).await;
        self.results
            .insert(&ValidationResult::new(submittable.id, &submittable.submission_id))
            .await
            .unwrap();
    }

    fn aggregator(&self) -> ValidationResultAggregator {
        ValidationResultAggregator::new(self.results.clone())
    }

    fn expander(&self) -> EnvelopeExpander {
        EnvelopeExpander::new(Arc::new(self.submittables.registry()))
    }

    fn handler(&self) -> SubmittableHandler {
        SubmittableHandler::new(
            self.aggregator(),
            self.expander(),
            self.catalog.clone(),
            self.publisher.clone(),
        )
    }

    fn core_validator(&self) -> CoreValidator {
        CoreValidator::new(
            ReferenceValidator::new(ReferenceRequirementValidator::new(
                self.results.clone(),
                self.catalog.clone(),
                WaitPolicy::default(),
            )),
            self.catalog.clone(),
            self.publisher.clone(),
        )
    }

    async fn envelope(&self, entity: &Submittable, data_type_id: Option<&str>) -> ValidationEnvelope {
        let ticket = self
            .aggregator()
            .request_new_round(entity.id, &[ValidationAuthor::Core])
            .await
            .unwrap();
        self.expander()
            .expand(entity, &ticket, data_type_id.map(str::to_string), None)
            .await
            .unwrap()
    }
}

fn data_type(id: &str, name: &str, kind: SubmittableKind) -> DataType {
    DataType {
        id: id.into(),
        display_name: name.into(),
        submittable_kind: kind,
        required_validation_authors: vec![ValidationAuthor::Core],
        optional_validation_authors: Vec::new(),
        ref_requirements: Vec::new(),
    }
}

fn requirement_catalog(extra_authors: Vec<ValidationAuthor>) -> ReferenceDataCatalog {
    let mut assay = data_type("ena-assay", "ENA assay", SubmittableKind::Assay);
    assay.ref_requirements.push(RefRequirement {
        ref_type: SubmittableKind::Study,
        data_type_id: "ena-study".into(),
        additional_required_validation_authors: extra_authors,
    });
    ReferenceDataCatalog::new(
        vec![
            assay,
            data_type("ena-study", "ENA study", SubmittableKind::Study),
            data_type("ml-study", "Metabolights study", SubmittableKind::Study),
        ],
        Vec::new(),
    )
}

fn assay_referencing(study: Reference, submission_id: &str) -> Submittable {
    Submittable::draft(SubmittableKind::Assay, "T", "assay-1", submission_id)
        .with_data_type("ena-assay")
        .with_links(SubmittableLinks::Assay {
            study_ref: Some(study),
            sample_uses: Vec::new(),
            protocol_uses: Vec::new(),
        })
}

#[tokio::test]
async fn study_referenced_by_accession_resolves_and_passes() {
    let h = Harness::new(ReferenceDataCatalog::default());
    let study = Submittable::draft(SubmittableKind::Study, "Other", "st", "sub-elsewhere")
        .with_accession("ST1");
    let assay = Submittable::draft(SubmittableKind::Assay, "T", "assay-1", "sub-1").with_links(
        SubmittableLinks::Assay {
            study_ref: Some(Reference::by_accession("ST1")),
            sample_uses: Vec::new(),
            protocol_uses: Vec::new(),
        },
    );
    h.register(&study).await;
    h.register(&assay).await;

    let envelope = h.envelope(&assay, None).await;
    assert_eq!(envelope.study().map(|s| s.id), Some(study.id));

    let batch = h.core_validator().validate(&envelope).await.unwrap();
    assert!(batch
        .results
        .iter()
        .all(|r| r.status == ValidationStatus::Pass));
}

#[tokio::test]
async fn only_the_same_submission_draft_sample_resolves() {
    let h = Harness::new(ReferenceDataCatalog::default());
    let mine = Submittable::draft(SubmittableKind::Sample, "TeamX", "s1", "sub-1");
    let theirs = Submittable::draft(SubmittableKind::Sample, "TeamX", "s1", "sub-2");
    h.register(&mine).await;
    h.register(&theirs).await;

    let assay = Submittable::draft(SubmittableKind::Assay, "TeamX", "assay-1", "sub-1").with_links(
        SubmittableLinks::Assay {
            study_ref: None,
            sample_uses: vec![SampleUse {
                reference: Reference::by_alias("TeamX", "s1"),
                role: None,
            }],
            protocol_uses: Vec::new(),
        },
    );
    h.register(&assay).await;

    let envelope = h.envelope(&assay, None).await;
    assert_eq!(
        envelope.samples().iter().map(|s| s.id).collect::<Vec<_>>(),
        vec![mine.id]
    );
}

#[tokio::test]
async fn wrong_target_data_type_yields_exactly_one_error() {
    let h = Harness::new(requirement_catalog(vec![ValidationAuthor::Ena]));
    let study = Submittable::draft(SubmittableKind::Study, "T", "st", "sub-1").with_data_type("ml-study");
    let assay = assay_referencing(Reference::by_alias("T", "st"), "sub-1");
    h.register(&study).await;
    h.register(&assay).await;

    let envelope = h.envelope(&assay, Some("ena-assay")).await;
    let batch = h.core_validator().validate(&envelope).await.unwrap();

    let errors: Vec<&SingleValidationResult> = batch.results.iter().filter(|r| r.is_error()).collect();
    assert_eq!(errors.len(), 1);
    let message = errors[0].message.as_deref().unwrap();
    assert!(message.contains("Metabolights study"));
    assert!(message.contains("ENA study"));
}

/// Validate an assay whose study's Ena verdict arrives `delay` into the wait.
async fn validate_with_ena_answer_after(
    delay: Duration,
) -> Result<AuthorResults, validation_core::CoordinatorError> {
    let h = Harness::new(requirement_catalog(vec![ValidationAuthor::Ena]));
    let study = Submittable::draft(SubmittableKind::Study, "T", "st", "sub-1")
        .with_data_type("ena-study")
        .with_accession("ST1");
    let assay = assay_referencing(Reference::by_accession("ST1"), "sub-1");
    h.register(&study).await;
    h.register(&assay).await;

    let study_ticket = h
        .aggregator()
        .request_new_round(study.id, &[ValidationAuthor::Ena])
        .await
        .unwrap();

    let aggregator = h.aggregator();
    let study_id = study.id;
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let answer = AuthorResults::new(
            study_ticket,
            study_id,
            ValidationAuthor::Ena,
            vec![SingleValidationResult::pass(ValidationAuthor::Ena, study_id)],
        );
        aggregator.handle_author_results(&answer).await.unwrap();
    });

    let envelope = h.envelope(&assay, Some("ena-assay")).await;
    h.core_validator().validate(&envelope).await
}

#[tokio::test(start_paused = true)]
async fn pending_required_author_that_passes_in_time_gives_no_errors() {
    let batch = validate_with_ena_answer_after(Duration::from_millis(800))
        .await
        .unwrap();
    assert!(batch.results.iter().all(|r| !r.is_error()));
}

#[tokio::test(start_paused = true)]
async fn answer_just_inside_the_wait_budget_is_still_accepted() {
    let batch = validate_with_ena_answer_after(Duration::from_millis(2500))
        .await
        .unwrap();
    assert!(batch.results.iter().all(|r| !r.is_error()));
}

#[tokio::test(start_paused = true)]
async fn answer_after_the_wait_budget_is_a_timeout() {
    let err = validate_with_ena_answer_after(Duration::from_millis(3500))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        validation_core::CoordinatorError::ReferenceWaitTimeout { waited_ms: 3000, .. }
    ));
}

#[tokio::test]
async fn changed_study_retriggers_its_dependent_once() {
    let h = Harness::new(ReferenceDataCatalog::default());
    let study = Submittable::draft(SubmittableKind::Study, "T", "st", "sub-1").with_accession("A1");
    let dependent = Submittable::draft(SubmittableKind::Assay, "T", "b", "sub-1").with_links(
        SubmittableLinks::Assay {
            study_ref: Some(Reference::by_accession("A1")),
            sample_uses: Vec::new(),
            protocol_uses: Vec::new(),
        },
    );
    h.register(&study).await;
    h.register(&dependent).await;

    let chained = ChainedValidationService::new(
        Arc::new(h.submittables.registry()),
        Arc::new(h.handler()),
    );
    let changed = SubmittableChanged::for_entity(&study);
    assert_eq!(chained.trigger_for_entity(&changed).await.unwrap(), 1);

    let stored = h.results.find_by_entity_uuid(dependent.id).await.unwrap().unwrap();
    assert_eq!(stored.version, 1);
    let untouched = h.results.find_by_entity_uuid(study.id).await.unwrap().unwrap();
    assert_eq!(untouched.version, 0);
    assert_eq!(
        h.publisher.routing_keys().await,
        vec!["core.assay.validation", "jsonschema.assay.validation"]
    );
}

#[tokio::test]
async fn full_round_completes_after_every_author_answers() {
    let h = Harness::new(ReferenceDataCatalog::default());
    let project = Submittable::draft(SubmittableKind::Project, "T", "p1", "sub-1");
    h.register(&project).await;

    assert!(h
        .handler()
        .handle_submittable(&SubmittableChanged::for_entity(&project))
        .await
        .unwrap());

    let messages = h.publisher.messages().await;
    let (key, payload) = &messages[0];
    assert_eq!(key, "core.project.validation");
    let envelope: ValidationEnvelope = serde_json::from_value(payload.clone()).unwrap();
    h.publisher.clear().await;

    let core_batch = h.core_validator().handle_request(&envelope).await.unwrap();
    assert_eq!(h.publisher.routing_keys().await, vec![routing::VALIDATION_SUCCESS]);

    let aggregator = h.aggregator();
    assert_eq!(
        aggregator.handle_author_results(&core_batch).await.unwrap(),
        AggregationOutcome::Applied { complete: false }
    );

    let schema_batch = AuthorResults::new(
        RoundTicket {
            uuid: envelope.validation_result_uuid,
            version: envelope.version,
        },
        project.id,
        ValidationAuthor::JsonSchema,
        vec![SingleValidationResult::warning(
            ValidationAuthor::JsonSchema,
            project.id,
            "description is short",
        )],
    );
    assert_eq!(
        aggregator.handle_author_results(&schema_batch).await.unwrap(),
        AggregationOutcome::Applied { complete: true }
    );

    let stored = h.results.find_by_entity_uuid(project.id).await.unwrap().unwrap();
    assert_eq!(stored.global_status, GlobalValidationStatus::Complete);
}

#[tokio::test]
async fn answer_from_superseded_round_cannot_complete_newer_round() {
    let h = Harness::new(ReferenceDataCatalog::default());
    let project = Submittable::draft(SubmittableKind::Project, "T", "p1", "sub-1");
    h.register(&project).await;
    let handler = h.handler();
    let event = SubmittableChanged::for_entity(&project);

    handler.handle_submittable(&event).await.unwrap();
    handler.handle_submittable(&event).await.unwrap();

    let stored = h.results.find_by_entity_uuid(project.id).await.unwrap().unwrap();
    let late = AuthorResults::new(
        RoundTicket {
            uuid: stored.uuid,
            version: 1,
        },
        project.id,
        ValidationAuthor::Core,
        vec![SingleValidationResult::pass(ValidationAuthor::Core, project.id)],
    );
    assert_eq!(
        h.aggregator().handle_author_results(&late).await.unwrap(),
        AggregationOutcome::Stale
    );
    let after = h.results.find_by_entity_uuid(project.id).await.unwrap().unwrap();
    assert_eq!(after, stored);
}
