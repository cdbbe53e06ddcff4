//! Validator roles
//!
//! Each role owns one queue, the topic patterns bound to it, and the engine
//! call made for every message it receives.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use validation_core::messages::{routing, AuthorResults, FileEvent, SubmittableChanged, SubmittableDeleted};
use validation_core::{
    AggregationOutcome, ChainedValidationService, CoreValidator, FileValidationService,
    SubmittableHandler, ValidationEnvelope, ValidationResultAggregator,
};

use crate::bus::BusMessage;
use crate::listener::{ListenerError, MessageHandler};

pub const SUBMITTABLE_QUEUE: &str = "coordinator.submittables";
pub const SUBMITTABLE_PATTERNS: &[&str] = &["submittable.*.changed"];

pub const RESULTS_QUEUE: &str = "coordinator.results";
pub const RESULTS_PATTERNS: &[&str] = &[routing::VALIDATION_SUCCESS, routing::VALIDATION_FAILURE];

pub const CORE_QUEUE: &str = "core.validation";
pub const CORE_PATTERNS: &[&str] = &["core.*.validation"];

pub const FILE_QUEUE: &str = "coordinator.files";
pub const FILE_PATTERNS: &[&str] = &[routing::FILE_CREATED, routing::FILE_DELETED];

pub const DELETION_QUEUE: &str = "coordinator.deletions";
pub const DELETION_PATTERNS: &[&str] = &[routing::SUBMITTABLE_DELETED];

/// Change notifications: open a round, then requeue a change for each
/// dependent not already in the event's chain.
pub struct SubmittableChangeRole {
    handler: SubmittableHandler,
    chained: Arc<ChainedValidationService>,
}

impl SubmittableChangeRole {
    pub fn new(handler: SubmittableHandler, chained: Arc<ChainedValidationService>) -> Self {
        Self { handler, chained }
    }
}

#[async_trait]
impl MessageHandler for SubmittableChangeRole {
    async fn handle(&self, message: &BusMessage) -> Result<(), ListenerError> {
        let event: SubmittableChanged = serde_json::from_value(message.payload.clone())?;
        if self.handler.handle_submittable(&event).await? {
            self.chained.trigger_for_entity(&event).await?;
        }
        Ok(())
    }
}

/// Author answers arriving on `validation.success` / `validation.failure`.
pub struct AuthorResultsRole {
    aggregator: ValidationResultAggregator,
}

impl AuthorResultsRole {
    pub fn new(aggregator: ValidationResultAggregator) -> Self {
        Self { aggregator }
    }
}

#[async_trait]
impl MessageHandler for AuthorResultsRole {
    async fn handle(&self, message: &BusMessage) -> Result<(), ListenerError> {
        if !RESULTS_PATTERNS.contains(&message.routing_key.as_str()) {
            return Err(ListenerError::UnexpectedRoutingKey(message.routing_key.clone()));
        }
        let batch: AuthorResults = serde_json::from_value(message.payload.clone())?;
        match self.aggregator.handle_author_results(&batch).await? {
            AggregationOutcome::Applied { complete: true } => info!(
                entity_uuid = %batch.entity_uuid,
                version = batch.version,
                "Entity validation complete"
            ),
            AggregationOutcome::Applied { complete: false } => debug!(
                entity_uuid = %batch.entity_uuid,
                author = %batch.author,
                "Author results recorded"
            ),
            AggregationOutcome::Stale => {}
        }
        Ok(())
    }
}

/// This engine's own `Core` author.
pub struct CoreValidationRole {
    core: CoreValidator,
}

impl CoreValidationRole {
    pub fn new(core: CoreValidator) -> Self {
        Self { core }
    }
}

#[async_trait]
impl MessageHandler for CoreValidationRole {
    async fn handle(&self, message: &BusMessage) -> Result<(), ListenerError> {
        let envelope: ValidationEnvelope = serde_json::from_value(message.payload.clone())?;
        self.core.handle_request(&envelope).await?;
        Ok(())
    }
}

/// Upload and removal of files.
pub struct FileEventRole {
    files: FileValidationService,
}

impl FileEventRole {
    pub fn new(files: FileValidationService) -> Self {
        Self { files }
    }
}

#[async_trait]
impl MessageHandler for FileEventRole {
    async fn handle(&self, message: &BusMessage) -> Result<(), ListenerError> {
        let event: FileEvent = serde_json::from_value(message.payload.clone())?;
        match message.routing_key.as_str() {
            routing::FILE_CREATED => {
                if let Some(file) = &event.file {
                    self.files.handle_file(file).await?;
                }
            }
            routing::FILE_DELETED => {}
            other => return Err(ListenerError::UnexpectedRoutingKey(other.to_string())),
        }
        self.files.sweep_file_references(&event.submission_id).await?;
        Ok(())
    }
}

/// Deletion of a submittable: its identity is gone, so the whole submission
/// is re-checked.
pub struct SubmittableDeletedRole {
    files: FileValidationService,
    chained: Arc<ChainedValidationService>,
}

impl SubmittableDeletedRole {
    pub fn new(files: FileValidationService, chained: Arc<ChainedValidationService>) -> Self {
        Self { files, chained }
    }
}

#[async_trait]
impl MessageHandler for SubmittableDeletedRole {
    async fn handle(&self, message: &BusMessage) -> Result<(), ListenerError> {
        let event: SubmittableDeleted = serde_json::from_value(message.payload.clone())?;
        self.files.sweep_file_references(&event.submission_id).await?;
        self.chained.trigger_for_submission(&event.submission_id).await?;
        Ok(())
    }
}
