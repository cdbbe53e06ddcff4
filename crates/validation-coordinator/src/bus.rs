//! In-process topic bus
//!
//! Routes published messages to bound queues by topic pattern, AMQP style:
//! words are dot-separated, `*` matches exactly one word and `#` matches
//! zero or more. A message is delivered once to every queue with a
//! matching pattern; a message no queue wants is logged and dropped.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

use validation_core::ports::MessagePublisher;

/// A message as it sits on a queue
#[derive(Debug, Clone, PartialEq)]
pub struct BusMessage {
    pub routing_key: String,
    pub payload: Value,
}

struct Binding {
    queue: String,
    patterns: Vec<String>,
    sender: mpsc::Sender<BusMessage>,
}

pub struct TopicBus {
    bindings: RwLock<Vec<Binding>>,
    capacity: usize,
}

impl TopicBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            bindings: RwLock::new(Vec::new()),
            capacity: capacity.max(1),
        }
    }

    /// Declare a queue bound to `patterns` and hand back its consuming end.
    pub async fn bind(&self, queue: &str, patterns: &[&str]) -> mpsc::Receiver<BusMessage> {
        let (sender, receiver) = mpsc::channel(self.capacity);
        self.bindings.write().await.push(Binding {
            queue: queue.to_string(),
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
            sender,
        });
        debug!(queue, patterns = ?patterns, "Queue bound");
        receiver
    }

    /// Queues a routing key would be delivered to.
    pub async fn route(&self, routing_key: &str) -> Vec<String> {
        self.bindings
            .read()
            .await
            .iter()
            .filter(|b| b.patterns.iter().any(|p| topic_matches(p, routing_key)))
            .map(|b| b.queue.clone())
            .collect()
    }
}

#[async_trait]
impl MessagePublisher for TopicBus {
    async fn publish(&self, routing_key: &str, payload: Value) -> Result<()> {
        let targets: Vec<(String, mpsc::Sender<BusMessage>)> = self
            .bindings
            .read()
            .await
            .iter()
            .filter(|b| b.patterns.iter().any(|p| topic_matches(p, routing_key)))
            .map(|b| (b.queue.clone(), b.sender.clone()))
            .collect();

        if targets.is_empty() {
            warn!(routing_key, "No queue bound for message; dropped");
            return Ok(());
        }

        for (queue, sender) in targets {
            let message = BusMessage {
                routing_key: routing_key.to_string(),
                payload: payload.clone(),
            };
            if sender.send(message).await.is_err() {
                warn!(queue = %queue, routing_key, "Queue consumer gone; message dropped");
            }
        }
        Ok(())
    }
}

/// AMQP topic matching: `*` is one word, `#` is zero or more words.
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    matches_words(&pattern, &key)
}

fn matches_words(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => (0..=key.len()).any(|skip| matches_words(rest, &key[skip..])),
        Some((word, rest)) => match key.split_first() {
            Some((head, tail)) => (*word == "*" || word == head) && matches_words(rest, tail),
            None => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_matching() {
        assert!(topic_matches("core.*.validation", "core.sample.validation"));
        assert!(!topic_matches("core.*.validation", "core.validation"));
        assert!(!topic_matches("core.*.validation", "jsonschema.sample.validation"));
        assert!(topic_matches("submittable.#", "submittable.deleted"));
        assert!(topic_matches("submittable.#", "submittable"));
        assert!(topic_matches("#.validation", "filereference.assaydata.validation"));
        assert!(topic_matches("validation.success", "validation.success"));
        assert!(!topic_matches("validation.success", "validation.failure"));
    }

    #[tokio::test]
    async fn test_publish_fans_out_to_matching_queues() {
        let bus = TopicBus::new(8);
        let mut core = bus.bind("core", &["core.*.validation"]).await;
        let mut audit = bus.bind("audit", &["#"]).await;
        let mut files = bus.bind("files", &["file.*"]).await;

        bus.publish("core.sample.validation", serde_json::json!({"n": 1}))
            .await
            .unwrap();

        assert_eq!(core.recv().await.unwrap().payload["n"], 1);
        assert_eq!(audit.recv().await.unwrap().routing_key, "core.sample.validation");
        assert!(files.try_recv().is_err());
        assert_eq!(bus.route("file.created").await, vec!["audit", "files"]);
    }

    #[tokio::test]
    async fn test_unrouted_message_is_dropped() {
        let bus = TopicBus::new(8);
        bus.publish("nobody.listens", Value::Null).await.unwrap();
        assert!(bus.route("nobody.listens").await.is_empty());
    }
}
