//! Validation Result Aggregator
//!
//! Owns the ValidationResult lifecycle: opening versioned rounds, merging
//! per-author answers and flipping the global status once every expected
//! author has answered. All writes are single-document conditional updates;
//! an answer tagged with a superseded version fails its check and is dropped.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{CoordinatorError, Result};
use crate::messages::AuthorResults;
use crate::ports::ValidationResultStore;
use crate::validation_result::{SingleValidationResult, ValidationAuthor, ValidationResult};

/// Authors that judge a file record
pub const FILE_AUTHORS: [ValidationAuthor; 2] =
    [ValidationAuthor::FileReference, ValidationAuthor::FileContent];

/// Identity of an open round, handed to every author with the request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundTicket {
    pub uuid: Uuid,
    pub version: u64,
}

impl From<&ValidationResult> for RoundTicket {
    fn from(result: &ValidationResult) -> Self {
        Self {
            uuid: result.uuid,
            version: result.version,
        }
    }
}

/// What happened to an author's batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationOutcome {
    /// Stored; `complete` is true when this answer completed the round
    Applied { complete: bool },
    /// Tagged with a superseded version (or an unknown entity) and dropped
    Stale,
}

#[derive(Clone)]
pub struct ValidationResultAggregator {
    store: Arc<dyn ValidationResultStore>,
}

impl ValidationResultAggregator {
    pub fn new(store: Arc<dyn ValidationResultStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ValidationResultStore> {
        &self.store
    }

    /// Open a new round expecting one answer from each of `authors`.
    ///
    /// Fails with `ValidationResultNotFound` when the entity was never
    /// registered, which means upstream state is corrupt.
    pub async fn request_new_round(
        &self,
        entity_uuid: Uuid,
        authors: &[ValidationAuthor],
    ) -> Result<RoundTicket> {
        let updated = self
            .store
            .open_round(entity_uuid, authors)
            .await?
            .ok_or(CoordinatorError::ValidationResultNotFound(entity_uuid))?;

        debug!(
            entity_uuid = %entity_uuid,
            version = updated.version,
            authors = ?authors,
            "Opened validation round"
        );
        Ok(RoundTicket::from(&updated))
    }

    /// Open a round for a file record, scoped to the file authors.
    pub async fn request_file_round(&self, file_id: Uuid) -> Result<RoundTicket> {
        self.request_new_round(file_id, &FILE_AUTHORS).await
    }

    /// Store an author's batch iff it belongs to the current round.
    /// FileContent answers are exempt from the version check.
    pub async fn accept_author_result(
        &self,
        entity_uuid: Uuid,
        version: u64,
        author: ValidationAuthor,
        results: &[SingleValidationResult],
    ) -> Result<bool> {
        let expected_version = author.is_version_bound().then_some(version);
        let applied = self
            .store
            .merge_author_results(entity_uuid, expected_version, author, results)
            .await?;

        if !applied {
            debug!(
                entity_uuid = %entity_uuid,
                version,
                author = %author,
                "Dropped stale author results"
            );
        }
        Ok(applied)
    }

    /// Mark the current round Complete iff every expected author has answered.
    /// Returns whether the status was flipped.
    pub async fn flip_if_complete(&self, entity_uuid: Uuid) -> Result<bool> {
        let Some(current) = self.store.find_by_entity_uuid(entity_uuid).await? else {
            warn!(entity_uuid = %entity_uuid, "No validation result to complete");
            return Ok(false);
        };
        if !current.is_complete() {
            return Ok(false);
        }

        let flipped = self.store.mark_complete(entity_uuid, current.version).await?;
        if flipped {
            info!(
                entity_uuid = %entity_uuid,
                version = current.version,
                "Validation round complete"
            );
        }
        Ok(flipped)
    }

    /// Accept one author's batch and check completion.
    pub async fn handle_author_results(&self, message: &AuthorResults) -> Result<AggregationOutcome> {
        let applied = self
            .accept_author_result(
                message.entity_uuid,
                message.version,
                message.author,
                &message.results,
            )
            .await?;
        if !applied {
            return Ok(AggregationOutcome::Stale);
        }

        let complete = self.flip_if_complete(message.entity_uuid).await?;
        Ok(AggregationOutcome::Applied { complete })
    }
}
