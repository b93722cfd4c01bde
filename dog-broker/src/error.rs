use thiserror::Error;

/// Result type for broker operations
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Infrastructure errors for the broker surface
#[derive(Error, Debug, Clone)]
pub enum BrokerError {
    #[error("Invalid configuration value for {key}: {value}")]
    InvalidConfig { key: String, value: String },

    #[error("Worker loop {worker} terminated abnormally: {reason}")]
    WorkerPanicked { worker: String, reason: String },

    #[error("Retry requeue task terminated abnormally: {0}")]
    Requeue(String),

    #[error("Failed to install tracing subscriber: {0}")]
    Tracing(String),
}

impl BrokerError {
    /// Create a configuration error for the given key/value pair
    pub fn invalid_config(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Outcome of a failed processing attempt.
///
/// This is the only error kind a worker produces. The worker loop converts it
/// into a `nack` immediately; it never escapes to the caller of `Broker::run`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{worker} failed processing {job}")]
pub struct JobError {
    /// Worker that attempted the job
    pub worker: String,

    /// Name of the job that failed
    pub job: String,
}

impl JobError {
    /// Create a job failure
    pub fn new(worker: impl Into<String>, job: impl Into<String>) -> Self {
        Self {
            worker: worker.into(),
            job: job.into(),
        }
    }
}
