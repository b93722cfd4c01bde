//! # dog-broker: In-Process Work Distribution
//!
//! A pool of workers pulls jobs from a shared FIFO queue. Failed attempts go
//! through a rate-limited retry queue, and jobs that exceed their retry budget
//! land in a dead-letter queue.
//!
//! ## Guarantees
//!
//! - **Conservation**: every submitted job is queued, retry-queued, in flight,
//!   dead-lettered or acknowledged, at every observation point
//! - **Exclusion**: a worker holds at most one in-flight job
//! - **Monotonic attempts**: a job's attempt counter grows by exactly one per
//!   negative acknowledgment and never shrinks
//! - **Termination**: worker loops stop once nothing is queued, retry-queued or
//!   in flight
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use dog_broker::prelude::*;
//!
//! # async fn demo() -> BrokerResult<()> {
//! let recorder = RecordingObserver::new();
//!
//! let broker = Broker::new(BrokerConfig::default().with_name("Third Service Center"))
//!     .with_observer(recorder.clone())
//!     .with_worker(Worker::new("Dalton", Duration::from_secs(10)))
//!     .with_worker(Worker::new("Wapol", Duration::from_secs(20)).with_failure_policy(NeverFail))
//!     .with_jobs([Job::new("Customer 1", "Lion"), Job::new("Customer 2", "Cat")]);
//!
//! let report = broker.run().await?;
//! for entry in &report.dead_letters {
//!     println!("{} ({}) failed {} times", entry.name, entry.category, entry.attempts);
//! }
//! # Ok(())
//! # }
//! ```

pub mod broker;
pub mod config;
pub mod error;
pub mod observability;
pub mod types;
pub mod worker;

pub use broker::{Broker, Delivery, NackOutcome, RequeueHandle, RetryRequeuer};
pub use config::BrokerConfig;
pub use error::{BrokerError, BrokerResult, JobError};
pub use types::{
    BrokerEvent, BrokerReport, BrokerSnapshot, DeadLetterEntry, Job, JobId, JobState, WorkerId,
};
pub use worker::{AlwaysFail, FailurePolicy, NeverFail, Processor, RandomFailure, Worker};

// Observability exports
pub use observability::{BrokerObserver, LiveMetrics, ObservabilityLayer, RecordingObserver};

#[cfg(feature = "tracing-basic")]
pub use observability::init_tracing;

/// Everything needed to wire a broker together
pub mod prelude {
    pub use crate::{
        Broker, BrokerConfig, BrokerError, BrokerResult, Job, JobError, WorkerId,
    };

    pub use crate::{
        AlwaysFail, FailurePolicy, NeverFail, Processor, RandomFailure, Worker,
    };

    pub use crate::{BrokerEvent, BrokerObserver, BrokerReport, RecordingObserver};

    pub use async_trait::async_trait;
}
