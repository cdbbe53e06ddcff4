//! Chained Validation Service
//!
//! When an entity changes, every entity in the same submission that
//! references it must be judged again. Dependents are found through the
//! submittable registry and handed to a [`ValidationTrigger`]. In the
//! running coordinator that trigger is [`RequeueTrigger`], which puts a
//! change message for each dependent back on the bus; handling that message
//! chains on to the dependent's own dependents, so propagation reaches every
//! transitive dependent one hop per message.
//!
//! Each change carries the chain of entities that caused it. A dependent
//! already in the chain is not re-triggered again, which ends cycles such as
//! two samples deriving from each other.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::handler::ValidationTrigger;
use crate::messages::{publish_json, routing, SubmittableChanged};
use crate::ports::{MessagePublisher, SubmittableRegistry};

pub struct ChainedValidationService {
    registry: Arc<SubmittableRegistry>,
    trigger: Arc<dyn ValidationTrigger>,
}

impl ChainedValidationService {
    pub fn new(registry: Arc<SubmittableRegistry>, trigger: Arc<dyn ValidationTrigger>) -> Self {
        Self { registry, trigger }
    }

    /// Re-validate every record in the submission that references the
    /// changed entity, skipping records already in the change's chain.
    /// Returns the number of dependents triggered.
    pub async fn trigger_for_entity(&self, changed: &SubmittableChanged) -> Result<usize> {
        let target = changed.entity.to_reference();
        let mut triggered = 0;

        for repository in self.registry.repositories() {
            let dependents = repository
                .find_by_submission_and_reference(&changed.submission_id, &target)
                .await?;
            for dependent in dependents.iter().filter(|d| !changed.involves(d.id)) {
                if self.retrigger(&changed.for_dependent(dependent)).await? {
                    triggered += 1;
                }
            }
        }

        info!(
            entity_uuid = %changed.entity.id,
            kind = %changed.kind(),
            submission_id = %changed.submission_id,
            depth = changed.caused_by.len(),
            triggered,
            "Chained validation triggered"
        );
        Ok(triggered)
    }

    /// Re-validate every record in the submission. Used after a deletion,
    /// when the deleted record can no longer be matched against. Every
    /// record is part of the same sweep, so none of them chains further.
    pub async fn trigger_for_submission(&self, submission_id: &str) -> Result<usize> {
        let mut swept = Vec::new();
        for repository in self.registry.repositories() {
            swept.extend(repository.find_by_submission(submission_id).await?);
        }
        let ids: Vec<Uuid> = swept.iter().map(|s| s.id).collect();

        let mut triggered = 0;
        for submittable in &swept {
            let event = SubmittableChanged {
                caused_by: ids.clone(),
                ..SubmittableChanged::for_entity(submittable)
            };
            if self.retrigger(&event).await? {
                triggered += 1;
            }
        }

        info!(submission_id, triggered, "Submission re-validation triggered");
        Ok(triggered)
    }

    /// A dependent that cannot be dispatched (unknown data type, missing
    /// validation result) is skipped; store and transport failures abort.
    async fn retrigger(&self, event: &SubmittableChanged) -> Result<bool> {
        debug!(
            entity_uuid = %event.entity.id,
            kind = %event.kind(),
            "Re-triggering validation"
        );
        match self.trigger.trigger(event).await {
            Ok(handled) => Ok(handled),
            Err(e) if !e.is_retryable() => {
                warn!(
                    entity_uuid = %event.entity.id,
                    error = %e,
                    "Skipping dependent that cannot be re-validated"
                );
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

/// Re-enters validation by publishing a change message for the entity,
/// to be picked up by whichever consumer handles `submittable.*.changed`.
pub struct RequeueTrigger {
    publisher: Arc<dyn MessagePublisher>,
}

impl RequeueTrigger {
    pub fn new(publisher: Arc<dyn MessagePublisher>) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl ValidationTrigger for RequeueTrigger {
    async fn trigger(&self, event: &SubmittableChanged) -> Result<bool> {
        let routing_key = routing::submittable_changed(event.kind());
        publish_json(self.publisher.as_ref(), &routing_key, event).await?;
        Ok(true)
    }
}
