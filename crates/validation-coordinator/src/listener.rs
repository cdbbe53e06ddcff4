//! Queue Listener
//!
//! One listener per queue, handling a bounded number of messages at once.
//! Each message is handed to the role's handler; retryable failures are
//! retried with a fixed backoff up to the configured maximum, everything
//! else goes to the dead-letter queue.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex, Semaphore};
use tracing::{debug, error, info, warn};

use validation_core::CoordinatorError;

use crate::bus::BusMessage;

/// A role's reaction to one message
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &BusMessage) -> Result<(), ListenerError>;
}

/// Errors that can occur in the listener
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("Malformed payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Unexpected routing key: {0}")]
    UnexpectedRoutingKey(String),

    #[error("Engine error: {0}")]
    Engine(#[from] CoordinatorError),
}

impl ListenerError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Engine(e) => e.is_retryable(),
            Self::Decode(_) | Self::UnexpectedRoutingKey(_) => false,
        }
    }
}

/// A message that could not be processed
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub queue: String,
    pub message: BusMessage,
    pub attempts: u32,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

/// Inspectable store of dead-lettered messages
#[derive(Default)]
pub struct DeadLetterQueue {
    entries: Mutex<Vec<DeadLetter>>,
}

impl DeadLetterQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, letter: DeadLetter) {
        self.entries.lock().await.push(letter);
    }

    pub async fn entries(&self) -> Vec<DeadLetter> {
        self.entries.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Retry and dead-letter handling shared by a listener's in-flight messages
#[derive(Clone)]
struct Delivery {
    queue: String,
    handler: Arc<dyn MessageHandler>,
    dlq: Arc<DeadLetterQueue>,
    max_retries: u32,
    backoff: Duration,
}

impl Delivery {
    async fn process(&self, message: BusMessage) {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.handler.handle(&message).await {
                Ok(()) => {
                    debug!(
                        queue = %self.queue,
                        routing_key = %message.routing_key,
                        attempt,
                        "Message processed"
                    );
                    return;
                }
                Err(e) if e.is_retryable() && attempt <= self.max_retries => {
                    warn!(
                        queue = %self.queue,
                        routing_key = %message.routing_key,
                        attempt,
                        error = %e,
                        "Message failed, will retry"
                    );
                    tokio::time::sleep(self.backoff).await;
                }
                Err(e) => {
                    error!(
                        queue = %self.queue,
                        routing_key = %message.routing_key,
                        attempts = attempt,
                        error = %e,
                        "Moving message to DLQ"
                    );
                    self.dlq
                        .push(DeadLetter {
                            queue: self.queue.clone(),
                            message,
                            attempts: attempt,
                            reason: e.to_string(),
                            failed_at: Utc::now(),
                        })
                        .await;
                    return;
                }
            }
        }
    }
}

pub struct CoordinatorListener {
    receiver: mpsc::Receiver<BusMessage>,
    delivery: Delivery,
    concurrency: u32,
}

impl CoordinatorListener {
    pub fn new(
        queue: impl Into<String>,
        receiver: mpsc::Receiver<BusMessage>,
        handler: Arc<dyn MessageHandler>,
        dlq: Arc<DeadLetterQueue>,
    ) -> Self {
        Self {
            receiver,
            delivery: Delivery {
                queue: queue.into(),
                handler,
                dlq,
                max_retries: 3,
                backoff: Duration::from_millis(1000),
            },
            concurrency: 1,
        }
    }

    pub fn with_retries(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.delivery.max_retries = max_retries;
        self.delivery.backoff = backoff;
        self
    }

    /// Handle up to `concurrency` messages from this queue at once.
    pub fn with_concurrency(mut self, concurrency: u32) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Drain the queue until shutdown is signalled or every publisher is
    /// gone, then wait for in-flight messages to finish.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let queue = self.delivery.queue.clone();
        let permits = Arc::new(Semaphore::new(self.concurrency as usize));
        info!(queue = %queue, concurrency = self.concurrency, "Queue listener started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                next = self.receiver.recv() => match next {
                    Some(message) => {
                        let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                            break;
                        };
                        let delivery = self.delivery.clone();
                        tokio::spawn(async move {
                            delivery.process(message).await;
                            drop(permit);
                        });
                    }
                    None => break,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        if permits.acquire_many(self.concurrency).await.is_err() {
            warn!(queue = %queue, "Listener permits closed before in-flight messages finished");
        }
        info!(queue = %queue, "Queue listener shutting down");
    }

    /// Handle one message, retrying retryable failures.
    pub async fn process(&self, message: BusMessage) {
        self.delivery.process(message).await;
    }
}
