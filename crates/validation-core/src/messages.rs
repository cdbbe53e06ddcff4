//! Message contracts
//!
//! Payloads exchanged with the other validator roles over the topic bus,
//! plus the routing keys they travel under.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregator::RoundTicket;
use crate::error::{CoordinatorError, Result};
use crate::ports::MessagePublisher;
use crate::submittable::{File, Submittable, SubmittableKind};
use crate::validation_result::{SingleValidationResult, ValidationAuthor};

/// Routing keys
pub mod routing {
    use crate::submittable::SubmittableKind;
    use crate::validation_result::ValidationAuthor;

    /// Author batches containing no Error
    pub const VALIDATION_SUCCESS: &str = "validation.success";
    /// Author batches containing at least one Error
    pub const VALIDATION_FAILURE: &str = "validation.failure";
    pub const FILE_CREATED: &str = "file.created";
    pub const FILE_DELETED: &str = "file.deleted";
    pub const SUBMITTABLE_DELETED: &str = "submittable.deleted";

    /// Entity segment used for file records
    pub const FILE_SEGMENT: &str = "file";

    /// `<author>.<entity>.validation`, lower-cased
    pub fn validation_request(author: ValidationAuthor, entity_segment: &str) -> String {
        format!("{}.{}.validation", author.as_str(), entity_segment).to_lowercase()
    }

    /// `submittable.<kind>.changed`
    pub fn submittable_changed(kind: SubmittableKind) -> String {
        format!("submittable.{}.changed", kind.routing_segment())
    }

    /// Routing key for an author batch: failure if any result is an Error
    pub fn for_results(results: &[super::SingleValidationResult]) -> &'static str {
        if results.iter().any(|r| r.is_error()) {
            VALIDATION_FAILURE
        } else {
            VALIDATION_SUCCESS
        }
    }
}

/// Encode `payload` and publish it under `routing_key`.
pub(crate) async fn publish_json<T: Serialize>(
    publisher: &dyn MessagePublisher,
    routing_key: &str,
    payload: &T,
) -> Result<()> {
    let value = serde_json::to_value(payload)?;
    publisher
        .publish(routing_key, value)
        .await
        .map_err(|source| CoordinatorError::Publish {
            routing_key: routing_key.to_string(),
            source,
        })
}

/// Inbound: a submittable was created or changed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittableChanged {
    pub entity: Submittable,
    pub submission_id: String,
    #[serde(default)]
    pub data_type_id: Option<String>,
    #[serde(default)]
    pub checklist_id: Option<String>,
    /// Entities whose change led to this one being re-validated, oldest first.
    /// Empty for changes made by a user.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub caused_by: Vec<Uuid>,
}

impl SubmittableChanged {
    /// Change event for a stored record, carrying its own data type and checklist.
    pub fn for_entity(entity: &Submittable) -> Self {
        Self {
            entity: entity.clone(),
            submission_id: entity.submission_id.clone(),
            data_type_id: entity.data_type_id.clone(),
            checklist_id: entity.checklist_id.clone(),
            caused_by: Vec::new(),
        }
    }

    /// Re-validation of `dependent` caused by this change.
    pub fn for_dependent(&self, dependent: &Submittable) -> Self {
        let mut caused_by = self.caused_by.clone();
        caused_by.push(self.entity.id);
        Self {
            caused_by,
            ..Self::for_entity(dependent)
        }
    }

    /// Whether `id` already took part in the chain that led here.
    pub fn involves(&self, id: Uuid) -> bool {
        self.entity.id == id || self.caused_by.contains(&id)
    }

    pub fn kind(&self) -> SubmittableKind {
        self.entity.kind()
    }
}

/// Inbound: one author's verdicts on one entity for one round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorResults {
    pub validation_result_uuid: Uuid,
    pub version: u64,
    pub author: ValidationAuthor,
    pub entity_uuid: Uuid,
    pub results: Vec<SingleValidationResult>,
}

impl AuthorResults {
    pub fn new(
        ticket: RoundTicket,
        entity_uuid: Uuid,
        author: ValidationAuthor,
        results: Vec<SingleValidationResult>,
    ) -> Self {
        Self {
            validation_result_uuid: ticket.uuid,
            version: ticket.version,
            author,
            entity_uuid,
            results,
        }
    }

    pub fn has_errors(&self) -> bool {
        self.results.iter().any(SingleValidationResult::is_error)
    }

    pub fn routing_key(&self) -> &'static str {
        routing::for_results(&self.results)
    }
}

/// Outbound: request to check a file record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileValidationRequest {
    pub validation_result_uuid: Uuid,
    pub version: u64,
    pub submission_id: String,
    pub file: File,
}

/// Inbound: a file was uploaded or removed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEvent {
    pub submission_id: String,
    #[serde(default)]
    pub file: Option<File>,
}

/// Inbound: a submittable was deleted; only its submission is known
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittableDeleted {
    pub submission_id: String,
}
