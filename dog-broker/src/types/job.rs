use serde::{Deserialize, Serialize};

use super::{JobId, WorkerId};

/// A unit of work moving through the broker.
///
/// Name and category are fixed at submission. The attempt counter is only
/// ever touched by the broker when a delivery is negatively acknowledged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    id: JobId,
    name: String,
    category: String,
    attempts: u32,
}

impl Job {
    /// Create a new job with zero attempts
    pub fn new(name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            id: JobId::new(),
            name: name.into(),
            category: category.into(),
            attempts: 0,
        }
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    /// Number of failed attempts recorded so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Record one failed attempt and return the new count
    pub(crate) fn record_failure(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }
}

/// Where a tracked job currently sits.
///
/// Acknowledged jobs are discarded by the broker and therefore have no state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    /// Waiting in the delivery queue
    Queued,

    /// Failed and waiting for the next requeue tick
    RetryQueued,

    /// Delivered to a worker and not yet acknowledged
    InFlight { worker: WorkerId },

    /// Exhausted its retry budget
    DeadLettered,
}

impl JobState {
    /// Check if the job reached a terminal location
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::DeadLettered)
    }

    /// Get the state name as a string
    pub fn name(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::RetryQueued => "retry_queued",
            Self::InFlight { .. } => "in_flight",
            Self::DeadLettered => "dead_lettered",
        }
    }
}
