//! File validation
//!
//! Files follow a narrower path than submittables: a round scoped to the
//! FileReference and FileContent authors. Uploads and deletions also change
//! whether AssayData and Analysis records point at real files, so those are
//! re-checked by FileReference inside their current round.

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::aggregator::{RoundTicket, ValidationResultAggregator, FILE_AUTHORS};
use crate::error::{CoordinatorError, Result};
use crate::messages::{publish_json, routing, FileValidationRequest};
use crate::ports::{MessagePublisher, SubmittableRegistry};
use crate::resolver::EnvelopeExpander;
use crate::submittable::{File, SubmittableKind};
use crate::validation_result::ValidationAuthor;

#[derive(Clone)]
pub struct FileValidationService {
    aggregator: ValidationResultAggregator,
    registry: Arc<SubmittableRegistry>,
    expander: EnvelopeExpander,
    publisher: Arc<dyn MessagePublisher>,
}

impl FileValidationService {
    pub fn new(
        aggregator: ValidationResultAggregator,
        registry: Arc<SubmittableRegistry>,
        publisher: Arc<dyn MessagePublisher>,
    ) -> Self {
        let expander = EnvelopeExpander::new(Arc::clone(&registry));
        Self {
            aggregator,
            registry,
            expander,
            publisher,
        }
    }

    /// Open a file round and ask both file authors to judge it.
    /// Returns false when the file was never registered.
    pub async fn handle_file(&self, file: &File) -> Result<bool> {
        let ticket = match self.aggregator.request_file_round(file.id).await {
            Ok(ticket) => ticket,
            Err(CoordinatorError::ValidationResultNotFound(file_id)) => {
                error!(file_id = %file_id, "File has no validation result; cannot dispatch");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        let request = FileValidationRequest {
            validation_result_uuid: ticket.uuid,
            version: ticket.version,
            submission_id: file.submission_id.clone(),
            file: file.clone(),
        };
        for author in FILE_AUTHORS {
            let routing_key = routing::validation_request(author, routing::FILE_SEGMENT);
            publish_json(self.publisher.as_ref(), &routing_key, &request).await?;
        }

        info!(
            file_id = %file.id,
            filename = %file.filename,
            version = ticket.version,
            "File validation dispatched"
        );
        Ok(true)
    }

    /// Re-send a FileReference request for every file-carrying record in the
    /// submission, tagged with its current version so the answer replaces
    /// the author's list without opening a new round. Records never put
    /// through a round are left alone; their first round covers files.
    pub async fn sweep_file_references(&self, submission_id: &str) -> Result<usize> {
        let mut requested = 0;

        for kind in SubmittableKind::ALL.into_iter().filter(SubmittableKind::carries_files) {
            let repository = self.registry.get(kind)?;
            let segment = kind.routing_segment();
            let routing_key = routing::validation_request(ValidationAuthor::FileReference, &segment);

            for entity in repository.find_by_submission(submission_id).await? {
                let Some(current) = self.aggregator.store().find_by_entity_uuid(entity.id).await?
                else {
                    warn!(entity_uuid = %entity.id, "Skipping file sweep for unregistered entity");
                    continue;
                };

                if current.version == 0 {
                    debug!(entity_uuid = %entity.id, "No round opened yet; skipping file sweep");
                    continue;
                }

                let ticket = RoundTicket::from(&current);
                let envelope = self
                    .expander
                    .expand(
                        &entity,
                        &ticket,
                        entity.data_type_id.clone(),
                        entity.checklist_id.clone(),
                    )
                    .await?;
                publish_json(self.publisher.as_ref(), &routing_key, &envelope).await?;
                debug!(
                    entity_uuid = %entity.id,
                    version = ticket.version,
                    "Requested file reference check"
                );
                requested += 1;
            }
        }

        info!(submission_id, requested, "File reference sweep complete");
        Ok(requested)
    }
}
