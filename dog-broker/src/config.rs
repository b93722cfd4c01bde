//! Broker configuration.
//!
//! Values follow the DogRS convention for environment overrides: variables
//! carrying the `DOG_BROKER__` prefix are stripped, lowercased and `__` is
//! mapped to `.`, so `DOG_BROKER__MAX_RETRY=5` sets `max_retry`.
//!
//! ```bash
//! export DOG_BROKER__RETRY_DELAY_MS=500
//! export DOG_BROKER__IDLE_BACKOFF_MS=50
//! ```

use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::{BrokerError, BrokerResult};

/// Environment prefix for broker overrides
pub const ENV_PREFIX: &str = "DOG_BROKER__";

/// Failed attempts a job may accumulate before it is dead-lettered
pub const DEFAULT_MAX_RETRY: u32 = 3;

/// Interval of the retry requeue ticker
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(3000);

/// Wait between polls when nothing is deliverable but work is still pending
pub const DEFAULT_IDLE_BACKOFF: Duration = Duration::from_millis(200);

/// Largest accepted broadcast channel capacity
pub const MAX_EVENT_CAPACITY: usize = 1 << 16;

/// Configuration for a broker
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Name used in narration and the final report
    pub name: String,
    /// A job is dead-lettered once its attempts exceed this value
    pub max_retry: u32,
    /// Requeue ticker period; one retry-queued job moves per tick
    pub retry_delay: Duration,
    /// Worker loop backoff while the broker is not yet idle
    pub idle_backoff: Duration,
    /// Capacity of the broadcast event channel, `1..=MAX_EVENT_CAPACITY`
    pub event_capacity: usize,
    /// Street address shown when the broker closes
    pub address: Option<String>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            name: "dog-broker".to_string(),
            max_retry: DEFAULT_MAX_RETRY,
            retry_delay: DEFAULT_RETRY_DELAY,
            idle_backoff: DEFAULT_IDLE_BACKOFF,
            event_capacity: 1024,
            address: None,
        }
    }
}

impl BrokerConfig {
    /// Set the broker name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the retry budget
    pub fn with_max_retry(mut self, max_retry: u32) -> Self {
        self.max_retry = max_retry;
        self
    }

    /// Set the requeue ticker period
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Set the idle backoff of worker loops
    pub fn with_idle_backoff(mut self, idle_backoff: Duration) -> Self {
        self.idle_backoff = idle_backoff;
        self
    }

    /// Set the broadcast channel capacity.
    ///
    /// Values outside `1..=MAX_EVENT_CAPACITY` are clamped when the broker is
    /// built.
    pub fn with_event_capacity(mut self, event_capacity: usize) -> Self {
        self.event_capacity = event_capacity;
        self
    }

    /// Set the address narrated on close
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Defaults layered with `DOG_BROKER__*` environment variables
    pub fn from_env() -> BrokerResult<Self> {
        Self::from_vars(std::env::vars())
    }

    /// Defaults layered with the given key/value pairs.
    ///
    /// Keys without the prefix and unknown keys are ignored.
    pub fn from_vars<I, K, V>(vars: I) -> BrokerResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();

        for (key, value) in vars {
            let Some(stripped) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let normalized = stripped.to_lowercase().replace("__", ".");
            let value = value.as_ref();

            match normalized.as_str() {
                "name" => config.name = value.to_string(),
                "max_retry" => config.max_retry = parse(&normalized, value)?,
                "retry_delay_ms" => {
                    config.retry_delay = Duration::from_millis(parse(&normalized, value)?)
                }
                "idle_backoff_ms" => {
                    config.idle_backoff = Duration::from_millis(parse(&normalized, value)?)
                }
                "event_capacity" => {
                    let capacity: usize = parse(&normalized, value)?;
                    if capacity == 0 || capacity > MAX_EVENT_CAPACITY {
                        return Err(BrokerError::invalid_config(&normalized, value));
                    }
                    config.event_capacity = capacity;
                }
                "address" => config.address = Some(value.to_string()),
                other => debug!("Ignoring unknown broker setting: {}", other),
            }
        }

        Ok(config)
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> BrokerResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| BrokerError::invalid_config(key, value))
}
