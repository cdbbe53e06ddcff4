//! Core validator
//!
//! This engine's own validation author. Consumes `core.<kind>.validation`
//! envelopes, judges the entity's references and answers with one `Core`
//! batch on `validation.success` or `validation.failure`.

use std::sync::Arc;
use tracing::info;

use crate::aggregator::RoundTicket;
use crate::envelope::ValidationEnvelope;
use crate::error::{CoordinatorError, Result};
use crate::messages::{publish_json, AuthorResults};
use crate::ports::{MessagePublisher, ReferenceDataStore};
use crate::reference_validator::ReferenceValidator;
use crate::validation_result::{SingleValidationResult, ValidationAuthor};

pub struct CoreValidator {
    references: ReferenceValidator,
    reference_data: Arc<dyn ReferenceDataStore>,
    publisher: Arc<dyn MessagePublisher>,
}

impl CoreValidator {
    pub fn new(
        references: ReferenceValidator,
        reference_data: Arc<dyn ReferenceDataStore>,
        publisher: Arc<dyn MessagePublisher>,
    ) -> Self {
        Self {
            references,
            reference_data,
            publisher,
        }
    }

    /// Judge the envelope. The batch is never empty: no findings is a Pass.
    pub async fn validate(&self, envelope: &ValidationEnvelope) -> Result<AuthorResults> {
        let data_type = match envelope.data_type_id.as_deref() {
            Some(id) => Some(
                self.reference_data
                    .find_data_type(id)
                    .await?
                    .ok_or_else(|| CoordinatorError::UnknownDataType(id.to_string()))?,
            ),
            None => None,
        };

        let entity_uuid = envelope.entity_uuid();
        let mut results = self.references.validate(envelope, data_type.as_ref()).await?;
        if results.is_empty() {
            results.push(SingleValidationResult::pass(ValidationAuthor::Core, entity_uuid));
        }

        Ok(AuthorResults::new(
            RoundTicket {
                uuid: envelope.validation_result_uuid,
                version: envelope.version,
            },
            entity_uuid,
            ValidationAuthor::Core,
            results,
        ))
    }

    /// Validate and publish the batch for the aggregator.
    pub async fn handle_request(&self, envelope: &ValidationEnvelope) -> Result<AuthorResults> {
        let batch = self.validate(envelope).await?;
        let routing_key = batch.routing_key();
        publish_json(self.publisher.as_ref(), routing_key, &batch).await?;

        info!(
            entity_uuid = %batch.entity_uuid,
            version = batch.version,
            results = batch.results.len(),
            routing_key,
            "Core validation answered"
        );
        Ok(batch)
    }
}
