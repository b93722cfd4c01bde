use std::sync::atomic::{AtomicU64, Ordering};
use serde::{Deserialize, Serialize};

use crate::BrokerEvent;

/// Live counters for broker transitions
#[derive(Debug, Default)]
pub struct LiveMetrics {
    jobs_submitted: AtomicU64,
    jobs_delivered: AtomicU64,
    jobs_acknowledged: AtomicU64,
    jobs_failed: AtomicU64,
    jobs_retried: AtomicU64,
    jobs_requeued: AtomicU64,
    jobs_dead_lettered: AtomicU64,
}

impl LiveMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one event
    pub fn record(&self, event: &BrokerEvent) {
        let counter = match event {
            BrokerEvent::Submitted { .. } => &self.jobs_submitted,
            BrokerEvent::Delivered { .. } => &self.jobs_delivered,
            BrokerEvent::Succeeded { .. } => &self.jobs_acknowledged,
            BrokerEvent::Failed { .. } => &self.jobs_failed,
            BrokerEvent::RetryScheduled { .. } => &self.jobs_retried,
            BrokerEvent::Requeued { .. } => &self.jobs_requeued,
            BrokerEvent::DeadLettered { .. } => &self.jobs_dead_lettered,
            BrokerEvent::Closed { .. } => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn jobs_submitted(&self) -> u64 {
        self.jobs_submitted.load(Ordering::Relaxed)
    }

    pub fn jobs_delivered(&self) -> u64 {
        self.jobs_delivered.load(Ordering::Relaxed)
    }

    pub fn jobs_acknowledged(&self) -> u64 {
        self.jobs_acknowledged.load(Ordering::Relaxed)
    }

    pub fn jobs_failed(&self) -> u64 {
        self.jobs_failed.load(Ordering::Relaxed)
    }

    pub fn jobs_retried(&self) -> u64 {
        self.jobs_retried.load(Ordering::Relaxed)
    }

    pub fn jobs_requeued(&self) -> u64 {
        self.jobs_requeued.load(Ordering::Relaxed)
    }

    pub fn jobs_dead_lettered(&self) -> u64 {
        self.jobs_dead_lettered.load(Ordering::Relaxed)
    }

    /// Collect current snapshot of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_submitted: self.jobs_submitted(),
            jobs_delivered: self.jobs_delivered(),
            jobs_acknowledged: self.jobs_acknowledged(),
            jobs_failed: self.jobs_failed(),
            jobs_retried: self.jobs_retried(),
            jobs_requeued: self.jobs_requeued(),
            jobs_dead_lettered: self.jobs_dead_lettered(),
        }
    }
}

/// Counters at a point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub jobs_submitted: u64,
    pub jobs_delivered: u64,
    pub jobs_acknowledged: u64,
    pub jobs_failed: u64,
    pub jobs_retried: u64,
    pub jobs_requeued: u64,
    pub jobs_dead_lettered: u64,
}

impl MetricsSnapshot {
    /// Share of finished attempts that succeeded, as a percentage
    pub fn success_rate(&self) -> f64 {
        let total_processed = self.jobs_acknowledged + self.jobs_failed;
        if total_processed == 0 {
            100.0
        } else {
            (self.jobs_acknowledged as f64 / total_processed as f64) * 100.0
        }
    }
}
