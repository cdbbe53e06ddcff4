use thiserror::Error;
use uuid::Uuid;

use crate::submittable::SubmittableKind;

/// Errors raised by the orchestration engine.
///
/// Validation verdicts are never errors; they travel as
/// `SingleValidationResult`s. Everything here aborts handling of one message.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("no validation result registered for entity {0}")]
    ValidationResultNotFound(Uuid),

    #[error("unknown data type: {0}")]
    UnknownDataType(String),

    #[error("unknown checklist: {0}")]
    UnknownChecklist(String),

    #[error("checklist {checklist_id} belongs to data type {checklist_data_type}, not {data_type}")]
    ChecklistMismatch {
        checklist_id: String,
        checklist_data_type: String,
        data_type: String,
    },

    #[error("no repository registered for {0}")]
    NoRepository(SubmittableKind),

    #[error("timed out after {waited_ms}ms waiting for {authors} on {target_uuid}")]
    ReferenceWaitTimeout {
        target_uuid: Uuid,
        authors: String,
        waited_ms: u64,
    },

    #[error("publish to {routing_key} failed: {source}")]
    Publish {
        routing_key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl CoordinatorError {
    /// Transport and store failures may succeed on redelivery; lookup/config
    /// failures and wait timeouts go straight to the dead-letter queue.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Publish { .. })
    }
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;
