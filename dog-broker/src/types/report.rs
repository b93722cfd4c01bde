use serde::{Deserialize, Serialize};

use super::{Job, JobId};

/// One row of the final dead-letter summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub job_id: JobId,
    pub name: String,
    pub category: String,
    pub attempts: u32,
}

impl From<&Job> for DeadLetterEntry {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id().clone(),
            name: job.name().to_string(),
            category: job.category().to_string(),
            attempts: job.attempts(),
        }
    }
}

/// Point-in-time job accounting.
///
/// Every submitted job is counted in exactly one of the location fields or in
/// `acknowledged`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerSnapshot {
    pub submitted: u64,
    pub queued: usize,
    pub retry_queued: usize,
    pub in_flight: usize,
    pub dead_lettered: usize,
    pub acknowledged: u64,
}

impl BrokerSnapshot {
    /// Jobs currently tracked in some location
    pub fn tracked(&self) -> u64 {
        (self.queued + self.retry_queued + self.in_flight + self.dead_lettered) as u64
    }

    /// Check the conservation invariant
    pub fn is_conserved(&self) -> bool {
        self.tracked() + self.acknowledged == self.submitted
    }

    /// Check idleness (dead letters and acknowledged jobs do not count)
    pub fn is_idle(&self) -> bool {
        self.queued == 0 && self.retry_queued == 0 && self.in_flight == 0
    }
}

/// Summary returned when a broker run completes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerReport {
    /// Broker name from configuration
    pub broker: String,

    /// Broker address, when configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// Jobs that exhausted their retry budget, in dead-letter order
    pub dead_letters: Vec<DeadLetterEntry>,

    /// Accounting at the moment the run finished
    pub snapshot: BrokerSnapshot,
}

impl BrokerReport {
    /// Render the report as pretty JSON
    #[cfg(feature = "json")]
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
