//! Submittable Handler
//!
//! Entry point for change notifications: works out which authors must judge
//! the entity, opens a new round and sends every author the expanded
//! envelope under `<author>.<kind>.validation`.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::aggregator::{RoundTicket, ValidationResultAggregator};
use crate::data_type::{Checklist, DataType};
use crate::error::{CoordinatorError, Result};
use crate::messages::{publish_json, routing, SubmittableChanged};
use crate::ports::{MessagePublisher, ReferenceDataStore};
use crate::resolver::EnvelopeExpander;
use crate::validation_result::ValidationAuthor;

/// Authors consulted when an entity names no DataType
pub const DEFAULT_AUTHORS: [ValidationAuthor; 2] =
    [ValidationAuthor::Core, ValidationAuthor::JsonSchema];

/// Re-entry point used by chained validation
#[async_trait]
pub trait ValidationTrigger: Send + Sync {
    /// Start a round for the entity; false when it was never registered.
    async fn trigger(&self, event: &SubmittableChanged) -> Result<bool>;
}

#[derive(Clone)]
pub struct SubmittableHandler {
    aggregator: ValidationResultAggregator,
    expander: EnvelopeExpander,
    reference_data: Arc<dyn ReferenceDataStore>,
    publisher: Arc<dyn MessagePublisher>,
}

impl SubmittableHandler {
    pub fn new(
        aggregator: ValidationResultAggregator,
        expander: EnvelopeExpander,
        reference_data: Arc<dyn ReferenceDataStore>,
        publisher: Arc<dyn MessagePublisher>,
    ) -> Self {
        Self {
            aggregator,
            expander,
            reference_data,
            publisher,
        }
    }

    /// Open a round for the changed entity and dispatch it to every author.
    ///
    /// Returns whether the entity had a ValidationResult to open a round on.
    /// Unknown DataType or Checklist ids are fatal for the message.
    pub async fn handle_submittable(&self, event: &SubmittableChanged) -> Result<bool> {
        let entity = &event.entity;
        let data_type = self.lookup_data_type(event.data_type_id.as_deref()).await?;
        let checklist = self
            .lookup_checklist(event.checklist_id.as_deref(), data_type.as_ref())
            .await?;

        let authors = match data_type.as_ref().map(DataType::all_authors) {
            Some(authors) if !authors.is_empty() => authors,
            Some(_) => {
                warn!(
                    entity_uuid = %entity.id,
                    data_type_id = ?event.data_type_id,
                    "DataType names no validation authors; using defaults"
                );
                DEFAULT_AUTHORS.to_vec()
            }
            None => DEFAULT_AUTHORS.to_vec(),
        };

        let ticket = match self.aggregator.request_new_round(entity.id, &authors).await {
            Ok(ticket) => ticket,
            Err(CoordinatorError::ValidationResultNotFound(entity_uuid)) => {
                error!(
                    entity_uuid = %entity_uuid,
                    kind = %entity.kind(),
                    submission_id = %event.submission_id,
                    "Entity has no validation result; cannot dispatch"
                );
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        self.dispatch(event, &ticket, &authors, checklist.map(|c| c.id))
            .await?;
        Ok(true)
    }

    async fn dispatch(
        &self,
        event: &SubmittableChanged,
        ticket: &RoundTicket,
        authors: &[ValidationAuthor],
        checklist_id: Option<String>,
    ) -> Result<()> {
        let entity = &event.entity;
        let envelope = self
            .expander
            .expand(entity, ticket, event.data_type_id.clone(), checklist_id)
            .await?;

        let segment = entity.kind().routing_segment();
        for author in authors {
            let routing_key = routing::validation_request(*author, &segment);
            publish_json(self.publisher.as_ref(), &routing_key, &envelope).await?;
            debug!(
                entity_uuid = %entity.id,
                version = ticket.version,
                routing_key = %routing_key,
                "Dispatched validation request"
            );
        }

        info!(
            entity_uuid = %entity.id,
            kind = %entity.kind(),
            version = ticket.version,
            authors = authors.len(),
            resolved = envelope.resolved.len(),
            "Validation round dispatched"
        );
        Ok(())
    }

    async fn lookup_data_type(&self, id: Option<&str>) -> Result<Option<DataType>> {
        let Some(id) = id else {
            return Ok(None);
        };
        self.reference_data
            .find_data_type(id)
            .await?
            .map(Some)
            .ok_or_else(|| CoordinatorError::UnknownDataType(id.to_string()))
    }

    async fn lookup_checklist(
        &self,
        id: Option<&str>,
        data_type: Option<&DataType>,
    ) -> Result<Option<Checklist>> {
        let Some(id) = id else {
            return Ok(None);
        };
        let checklist = self
            .reference_data
            .find_checklist(id)
            .await?
            .ok_or_else(|| CoordinatorError::UnknownChecklist(id.to_string()))?;

        if let Some(data_type) = data_type {
            if checklist.data_type_id != data_type.id {
                return Err(CoordinatorError::ChecklistMismatch {
                    checklist_id: checklist.id,
                    checklist_data_type: checklist.data_type_id,
                    data_type: data_type.id.clone(),
                });
            }
        }
        Ok(Some(checklist))
    }
}

#[async_trait]
impl ValidationTrigger for SubmittableHandler {
    async fn trigger(&self, event: &SubmittableChanged) -> Result<bool> {
        self.handle_submittable(event).await
    }
}
