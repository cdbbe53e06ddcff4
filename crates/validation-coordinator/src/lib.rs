//! Validation Coordinator
//!
//! Runs the validation engine as a set of queue consumers over an
//! in-process topic bus:
//!
//! ```text
//! submittable.*.changed ──► coordinator.submittables ──► SubmittableHandler + chained
//!        ▲                                                         │
//!        └──────────── one change per dependent ◄─────────────────┘
//! core.*.validation     ──► core.validation          ──► CoreValidator
//! validation.success|failure ──► coordinator.results  ──► ValidationResultAggregator
//! file.created|deleted  ──► coordinator.files        ──► FileValidationService
//! submittable.deleted   ──► coordinator.deletions    ──► sweep + chained
//! ```
//!
//! Messages for other authors (`jsonschema.*`, `ena.*`, ...) are published
//! on the same bus for whatever external validators bind to them.

pub mod bus;
pub mod config;
pub mod listener;
pub mod roles;

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use validation_core::ports::{MessagePublisher, ReferenceDataStore, SubmittableRegistry, ValidationResultStore};
use validation_core::{
    ChainedValidationService, CoreValidator, EnvelopeExpander, FileValidationService,
    ReferenceRequirementValidator, ReferenceValidator, RequeueTrigger, SubmittableHandler,
    ValidationResultAggregator,
};

pub use bus::{BusMessage, TopicBus};
pub use config::CoordinatorConfig;
pub use listener::{CoordinatorListener, DeadLetter, DeadLetterQueue, ListenerError, MessageHandler};

use roles::*;

/// External collaborators the engine runs against
#[derive(Clone)]
pub struct CoordinatorPorts {
    pub submittables: Arc<SubmittableRegistry>,
    pub results: Arc<dyn ValidationResultStore>,
    pub reference_data: Arc<dyn ReferenceDataStore>,
}

pub struct Coordinator {
    config: CoordinatorConfig,
    bus: Arc<TopicBus>,
    dlq: Arc<DeadLetterQueue>,
    handler: SubmittableHandler,
    aggregator: ValidationResultAggregator,
    chained: Arc<ChainedValidationService>,
    files: FileValidationService,
    ports: CoordinatorPorts,
}

impl Coordinator {
    pub fn new(config: CoordinatorConfig, ports: CoordinatorPorts) -> Self {
        let bus = Arc::new(TopicBus::new(config.queue_capacity));
        let publisher: Arc<dyn MessagePublisher> = bus.clone();

        let aggregator = ValidationResultAggregator::new(Arc::clone(&ports.results));
        let expander = EnvelopeExpander::new(Arc::clone(&ports.submittables));
        let handler = SubmittableHandler::new(
            aggregator.clone(),
            expander,
            Arc::clone(&ports.reference_data),
            Arc::clone(&publisher),
        );
        let chained = Arc::new(ChainedValidationService::new(
            Arc::clone(&ports.submittables),
            Arc::new(RequeueTrigger::new(Arc::clone(&publisher))),
        ));
        let files = FileValidationService::new(
            aggregator.clone(),
            Arc::clone(&ports.submittables),
            publisher,
        );

        Self {
            config,
            bus,
            dlq: Arc::new(DeadLetterQueue::new()),
            handler,
            aggregator,
            chained,
            files,
            ports,
        }
    }

    pub fn bus(&self) -> &Arc<TopicBus> {
        &self.bus
    }

    pub fn dead_letters(&self) -> &Arc<DeadLetterQueue> {
        &self.dlq
    }

    fn core_validator(&self) -> CoreValidator {
        let requirements = ReferenceRequirementValidator::new(
            Arc::clone(&self.ports.results),
            Arc::clone(&self.ports.reference_data),
            self.config.wait_policy(),
        );
        CoreValidator::new(
            ReferenceValidator::new(requirements),
            Arc::clone(&self.ports.reference_data),
            self.bus.clone(),
        )
    }

    /// Bind every queue and spawn its listener.
    pub async fn start(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let roles: Vec<(&str, &[&str], Arc<dyn MessageHandler>)> = vec![
            (
                SUBMITTABLE_QUEUE,
                SUBMITTABLE_PATTERNS,
                Arc::new(SubmittableChangeRole::new(
                    self.handler.clone(),
                    Arc::clone(&self.chained),
                )) as Arc<dyn MessageHandler>,
            ),
            (
                RESULTS_QUEUE,
                RESULTS_PATTERNS,
                Arc::new(AuthorResultsRole::new(self.aggregator.clone())) as Arc<dyn MessageHandler>,
            ),
            (
                CORE_QUEUE,
                CORE_PATTERNS,
                Arc::new(CoreValidationRole::new(self.core_validator())) as Arc<dyn MessageHandler>,
            ),
            (
                FILE_QUEUE,
                FILE_PATTERNS,
                Arc::new(FileEventRole::new(self.files.clone())) as Arc<dyn MessageHandler>,
            ),
            (
                DELETION_QUEUE,
                DELETION_PATTERNS,
                Arc::new(SubmittableDeletedRole::new(
                    self.files.clone(),
                    Arc::clone(&self.chained),
                )) as Arc<dyn MessageHandler>,
            ),
        ];

        let mut handles = Vec::with_capacity(roles.len());
        for (queue, patterns, handler) in roles {
            let receiver = self.bus.bind(queue, patterns).await;
            let listener = CoordinatorListener::new(queue, receiver, handler, Arc::clone(&self.dlq))
                .with_retries(self.config.listener_max_retries, self.config.listener_backoff)
                .with_concurrency(self.config.listener_concurrency);
            handles.push(tokio::spawn(listener.run(shutdown.clone())));
        }

        tracing::info!(listeners = handles.len(), "Coordinator started");
        handles
    }
}
