use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{DeadLetterEntry, Job, JobId, WorkerId};

/// Narration protocol emitted by the broker for every job transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BrokerEvent {
    /// Job was accepted into the delivery queue
    Submitted {
        job: Job,
        at: DateTime<Utc>,
    },

    /// Job was handed to a worker
    Delivered {
        worker: WorkerId,
        job: Job,
        at: DateTime<Utc>,
    },

    /// Worker finished the job and acknowledged it
    Succeeded {
        worker: WorkerId,
        job: Job,
        at: DateTime<Utc>,
    },

    /// Worker reported a failed attempt (attempts already incremented)
    Failed {
        worker: WorkerId,
        job: Job,
        at: DateTime<Utc>,
    },

    /// Failed job parked in the retry queue
    RetryScheduled {
        job: Job,
        delay_ms: u64,
        at: DateTime<Utc>,
    },

    /// Requeue tick moved a job from the retry queue back to the queue
    Requeued {
        job: Job,
        at: DateTime<Utc>,
    },

    /// Job exceeded the retry limit and was sent to the dead-letter queue
    DeadLettered {
        job: Job,
        max_retry: u32,
        at: DateTime<Utc>,
    },

    /// Run loop finished
    Closed {
        broker: String,
        address: Option<String>,
        dead_letters: Vec<DeadLetterEntry>,
        at: DateTime<Utc>,
    },
}

impl BrokerEvent {
    /// Get event type name as string
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Submitted { .. } => "submitted",
            Self::Delivered { .. } => "delivered",
            Self::Succeeded { .. } => "succeeded",
            Self::Failed { .. } => "failed",
            Self::RetryScheduled { .. } => "retry_scheduled",
            Self::Requeued { .. } => "requeued",
            Self::DeadLettered { .. } => "dead_lettered",
            Self::Closed { .. } => "closed",
        }
    }

    /// Get the job this event is about, if any
    pub fn job(&self) -> Option<&Job> {
        match self {
            Self::Submitted { job, .. }
            | Self::Delivered { job, .. }
            | Self::Succeeded { job, .. }
            | Self::Failed { job, .. }
            | Self::RetryScheduled { job, .. }
            | Self::Requeued { job, .. }
            | Self::DeadLettered { job, .. } => Some(job),
            Self::Closed { .. } => None,
        }
    }

    /// Get the job ID from any job event
    pub fn job_id(&self) -> Option<&JobId> {
        self.job().map(Job::id)
    }

    /// Get the timestamp from any event
    pub fn timestamp(&self) -> &DateTime<Utc> {
        match self {
            Self::Submitted { at, .. } => at,
            Self::Delivered { at, .. } => at,
            Self::Succeeded { at, .. } => at,
            Self::Failed { at, .. } => at,
            Self::RetryScheduled { at, .. } => at,
            Self::Requeued { at, .. } => at,
            Self::DeadLettered { at, .. } => at,
            Self::Closed { at, .. } => at,
        }
    }
}
