pub mod failure;

pub use failure::{AlwaysFail, FailurePolicy, NeverFail, RandomFailure};

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use tracing::{debug, info};

use crate::{Job, JobError, WorkerId};

/// Something that can take a delivered job and report its outcome.
///
/// The broker runs one loop per processor and only ever hands it one job at
/// a time.
#[async_trait]
pub trait Processor: Send + Sync + 'static {
    /// Identity used as the in-flight registry key
    fn id(&self) -> &WorkerId;

    /// Process one job; `Err` means the attempt failed and should be nacked
    async fn process(&self, job: &Job) -> Result<(), JobError>;
}

#[async_trait]
impl<P: Processor + ?Sized> Processor for Arc<P> {
    fn id(&self) -> &WorkerId {
        (**self).id()
    }

    async fn process(&self, job: &Job) -> Result<(), JobError> {
        (**self).process(job).await
    }
}

/// Timed worker whose attempts fail according to an injected policy
pub struct Worker {
    id: WorkerId,
    mean_service: Duration,
    failure: Arc<dyn FailurePolicy>,
    busy: AtomicBool,
}

impl Worker {
    /// Create a worker failing at the default random rate
    pub fn new(name: impl Into<String>, mean_service: Duration) -> Self {
        Self {
            id: WorkerId(name.into()),
            mean_service,
            failure: Arc::new(RandomFailure::default()),
            busy: AtomicBool::new(false),
        }
    }

    /// Replace the failure policy
    pub fn with_failure_policy(mut self, policy: impl FailurePolicy + 'static) -> Self {
        self.failure = Arc::new(policy);
        self
    }

    pub fn mean_service(&self) -> Duration {
        self.mean_service
    }

    /// Observability only; exclusion is enforced by the broker
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("mean_service", &self.mean_service)
            .field("busy", &self.is_busy())
            .finish()
    }
}

#[async_trait]
impl Processor for Worker {
    fn id(&self) -> &WorkerId {
        &self.id
    }

    async fn process(&self, job: &Job) -> Result<(), JobError> {
        {
            let _busy = BusyGuard::engage(&self.busy);
            info!(
                worker = %self.id,
                job = job.name(),
                category = job.category(),
                attempt = job.attempts(),
                "Processing job"
            );
            tokio::time::sleep(self.mean_service).await;
        }

        if self.failure.should_fail() {
            debug!(worker = %self.id, job = job.name(), "Attempt failed");
            Err(JobError::new(self.id.as_str(), job.name()))
        } else {
            debug!(worker = %self.id, job = job.name(), "Attempt succeeded");
            Ok(())
        }
    }
}

/// Clears the busy flag even if the processing future is dropped
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn engage(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
