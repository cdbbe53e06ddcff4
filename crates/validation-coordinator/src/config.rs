//! Environment configuration
//!
//! | Variable | Default |
//! |---|---|
//! | `VALIDATION_REF_WAIT_INTERVAL_MS` | 1000 |
//! | `VALIDATION_REF_WAIT_TIMEOUT_MS` | 3000 |
//! | `VALIDATION_LISTENER_MAX_RETRIES` | 3 |
//! | `VALIDATION_LISTENER_BACKOFF_MS` | 1000 |
//! | `VALIDATION_LISTENER_CONCURRENCY` | 4 |
//! | `VALIDATION_QUEUE_CAPACITY` | 1024 |
//! | `VALIDATION_DATA_TYPES_PATH` | unset (empty catalog) |
//! | `VALIDATION_DATABASE_URL` | unset (in-memory store) |

use std::path::PathBuf;
use std::time::Duration;

use validation_core::WaitPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    pub ref_wait_interval: Duration,
    pub ref_wait_timeout: Duration,
    pub listener_max_retries: u32,
    pub listener_backoff: Duration,
    /// Messages handled at once per queue
    pub listener_concurrency: u32,
    pub queue_capacity: usize,
    pub data_types_path: Option<PathBuf>,
    pub database_url: Option<String>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            ref_wait_interval: Duration::from_millis(1000),
            ref_wait_timeout: Duration::from_millis(3000),
            listener_max_retries: 3,
            listener_backoff: Duration::from_millis(1000),
            listener_concurrency: 4,
            queue_capacity: 1024,
            data_types_path: None,
            database_url: None,
        }
    }
}

impl CoordinatorConfig {
    /// Read the process environment. Unparseable values fall back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` uses the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let millis = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(default)
        };

        Self {
            ref_wait_interval: millis("VALIDATION_REF_WAIT_INTERVAL_MS", defaults.ref_wait_interval),
            ref_wait_timeout: millis("VALIDATION_REF_WAIT_TIMEOUT_MS", defaults.ref_wait_timeout),
            listener_max_retries: lookup("VALIDATION_LISTENER_MAX_RETRIES")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.listener_max_retries),
            listener_backoff: millis("VALIDATION_LISTENER_BACKOFF_MS", defaults.listener_backoff),
            listener_concurrency: lookup("VALIDATION_LISTENER_CONCURRENCY")
                .and_then(|v| v.parse().ok())
                .filter(|c: &u32| *c > 0)
                .unwrap_or(defaults.listener_concurrency),
            queue_capacity: lookup("VALIDATION_QUEUE_CAPACITY")
                .and_then(|v| v.parse().ok())
                .filter(|c: &usize| *c > 0)
                .unwrap_or(defaults.queue_capacity),
            data_types_path: lookup("VALIDATION_DATA_TYPES_PATH").map(PathBuf::from),
            database_url: lookup("VALIDATION_DATABASE_URL").filter(|v| !v.is_empty()),
        }
    }

    pub fn wait_policy(&self) -> WaitPolicy {
        WaitPolicy::new(self.ref_wait_interval, self.ref_wait_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_when_unset() {
        let config = CoordinatorConfig::from_lookup(|_| None);
        assert_eq!(config, CoordinatorConfig::default());
        assert_eq!(config.wait_policy(), WaitPolicy::default());
    }

    #[test]
    fn test_overrides_and_bad_values() {
        let env: HashMap<&str, &str> = [
            ("VALIDATION_REF_WAIT_INTERVAL_MS", "250"),
            ("VALIDATION_REF_WAIT_TIMEOUT_MS", "not-a-number"),
            ("VALIDATION_LISTENER_MAX_RETRIES", "5"),
            ("VALIDATION_QUEUE_CAPACITY", "0"),
            ("VALIDATION_LISTENER_CONCURRENCY", "16"),
            ("VALIDATION_DATA_TYPES_PATH", "config/data_types.yaml"),
        ]
        .into_iter()
        .collect();
        let config = CoordinatorConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.ref_wait_interval, Duration::from_millis(250));
        assert_eq!(config.ref_wait_timeout, Duration::from_millis(3000));
        assert_eq!(config.listener_max_retries, 5);
        assert_eq!(config.queue_capacity, 1024);
        assert_eq!(config.listener_concurrency, 16);
        assert_eq!(
            config.data_types_path,
            Some(PathBuf::from("config/data_types.yaml"))
        );
        assert!(config.database_url.is_none());
    }
}
