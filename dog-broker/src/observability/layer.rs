use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use futures_core::Stream;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::{BrokerObserver, LiveMetrics};
use crate::config::MAX_EVENT_CAPACITY;
use crate::BrokerEvent;

/// Type alias for boxed streams (stable Rust compatible)
pub type BoxStream<T> = Pin<Box<dyn Stream<Item = T> + Send + 'static>>;

/// Fans broker events out to tracing, counters, subscribers and observers
#[derive(Clone)]
pub struct ObservabilityLayer {
    event_broadcaster: broadcast::Sender<BrokerEvent>,
    metrics: Arc<LiveMetrics>,
    observers: Vec<Arc<dyn BrokerObserver>>,
}

impl ObservabilityLayer {
    /// Create a layer whose broadcast channel holds `capacity` events,
    /// clamped to `1..=MAX_EVENT_CAPACITY`
    pub fn new(capacity: usize) -> Self {
        let (event_broadcaster, _) = broadcast::channel(capacity.clamp(1, MAX_EVENT_CAPACITY));

        Self {
            event_broadcaster,
            metrics: Arc::new(LiveMetrics::new()),
            observers: Vec::new(),
        }
    }

    /// Register an observer
    pub fn with_observer(mut self, observer: impl BrokerObserver + 'static) -> Self {
        self.observers.push(Arc::new(observer));
        self
    }

    /// Register an already shared observer
    pub fn with_shared_observer(mut self, observer: Arc<dyn BrokerObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Publish one event
    pub fn emit(&self, event: BrokerEvent) {
        narrate(&event);
        self.metrics.record(&event);

        for observer in &self.observers {
            observer.on_event(&event);
        }

        // No subscribers is fine
        let _ = self.event_broadcaster.send(event);
    }

    /// Event stream for observability (boxed for stable Rust).
    ///
    /// Subscribers that fall behind by more than the channel capacity skip the
    /// lagged events.
    pub fn subscribe(&self) -> BoxStream<BrokerEvent> {
        let receiver = self.event_broadcaster.subscribe();
        use tokio_stream::{wrappers::BroadcastStream, StreamExt};
        let stream = BroadcastStream::new(receiver)
            .filter_map(|result| result.ok());

        Box::pin(stream)
    }

    /// Get live metrics
    pub fn metrics(&self) -> &LiveMetrics {
        &self.metrics
    }
}

impl Default for ObservabilityLayer {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl fmt::Debug for ObservabilityLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservabilityLayer")
            .field("observers", &self.observers.len())
            .field("subscribers", &self.event_broadcaster.receiver_count())
            .finish()
    }
}

fn narrate(event: &BrokerEvent) {
    match event {
        BrokerEvent::Submitted { job, .. } => {
            debug!(job = job.name(), category = job.category(), "Job submitted");
        }
        BrokerEvent::Delivered { worker, job, .. } => {
            info!(
                worker = %worker,
                job = job.name(),
                category = job.category(),
                "{} calling {}", worker, job.name()
            );
        }
        BrokerEvent::Succeeded { worker, job, .. } => {
            info!(worker = %worker, job = job.name(), "{} finished {}", worker, job.name());
        }
        BrokerEvent::Failed { worker, job, .. } => {
            warn!(
                worker = %worker,
                job = job.name(),
                attempts = job.attempts(),
                "{} failed processing {}", worker, job.name()
            );
        }
        BrokerEvent::RetryScheduled { job, delay_ms, .. } => {
            warn!(
                job = job.name(),
                attempts = job.attempts(),
                "Retrying {} in {}s", job.name(), *delay_ms as f64 / 1000.0
            );
        }
        BrokerEvent::Requeued { job, .. } => {
            info!(job = job.name(), attempts = job.attempts(), "Requeued {}", job.name());
        }
        BrokerEvent::DeadLettered { job, max_retry, .. } => {
            error!(
                job = job.name(),
                attempts = job.attempts(),
                max_retry,
                "{} exceeded retry limit. Sent to DLQ", job.name()
            );
        }
        BrokerEvent::Closed { broker, address: Some(address), dead_letters, .. } => {
            info!(
                broker = %broker,
                address = %address,
                dead_letters = dead_letters.len(),
                "{} at {} closed", broker, address
            );
        }
        BrokerEvent::Closed { broker, address: None, dead_letters, .. } => {
            info!(broker = %broker, dead_letters = dead_letters.len(), "{} closed", broker);
        }
    }
}
