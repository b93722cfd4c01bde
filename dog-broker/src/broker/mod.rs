pub mod requeue;
mod runner;
mod state;

pub use requeue::{RequeueHandle, RetryRequeuer};
pub use state::{Delivery, NackOutcome};

use std::fmt;
use std::sync::Arc;
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use tracing::{error, info, instrument, Instrument};

use crate::{
    BrokerConfig, BrokerError, BrokerEvent, BrokerObserver, BrokerReport, BrokerResult,
    BrokerSnapshot, DeadLetterEntry, Job, JobId, JobState, Processor, WorkerId,
    observability::{BoxStream, LiveMetrics, ObservabilityLayer},
};
use runner::WorkerLoop;
use state::BrokerState;

/// In-process work broker.
///
/// All four job collections sit behind a single mutex and every public
/// operation holds it for its whole body, so concurrent worker loops always
/// observe a consistent interleaving. Events are published before the lock
/// is released, so observers and subscribers see them in transition order.
/// Observers therefore must not call back into the broker. Cloning is cheap
/// and shares the same state.
#[derive(Clone)]
pub struct Broker {
    state: Arc<Mutex<BrokerState>>,
    workers: Vec<Arc<dyn Processor>>,
    observability: ObservabilityLayer,
    config: BrokerConfig,
}

impl Broker {
    /// Create an empty broker
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(BrokerState::default())),
            workers: Vec::new(),
            observability: ObservabilityLayer::new(config.event_capacity),
            config,
        }
    }

    /// Add a worker; one processing loop runs per worker
    pub fn with_worker(mut self, worker: impl Processor) -> Self {
        self.workers.push(Arc::new(worker));
        self
    }

    /// Add an already shared worker
    pub fn with_shared_worker(mut self, worker: Arc<dyn Processor>) -> Self {
        self.workers.push(worker);
        self
    }

    /// Submit the given jobs in order
    pub fn with_jobs(self, jobs: impl IntoIterator<Item = Job>) -> Self {
        for job in jobs {
            self.submit(job);
        }
        self
    }

    /// Register a narration observer.
    ///
    /// Only events emitted after registration are observed.
    pub fn with_observer(mut self, observer: impl BrokerObserver + 'static) -> Self {
        self.observability = self.observability.with_observer(observer);
        self
    }

    /// Append a job to the tail of the delivery queue
    pub fn submit(&self, job: Job) -> JobId {
        let id = job.id().clone();
        let mut state = self.state.lock();
        state.submit(job.clone());

        self.observability.emit(BrokerEvent::Submitted { job, at: Utc::now() });
        id
    }

    /// Hand the head of the queue to `worker`.
    ///
    /// Returns `None` when the queue is empty or `worker` already holds a job.
    pub fn deliver(&self, worker: &WorkerId) -> Option<Job> {
        let mut state = self.state.lock();
        let job = state.deliver(worker)?;
        self.emit_delivered(worker, &job);
        Some(job)
    }

    /// Deliver, or tell the caller whether the broker drained, atomically
    pub fn next_delivery(&self, worker: &WorkerId) -> Delivery {
        let mut state = self.state.lock();
        let delivery = state.next_delivery(worker);
        if let Delivery::Job(ref job) = delivery {
            self.emit_delivered(worker, job);
        }
        delivery
    }

    /// Discard the job in flight for `worker` as successfully processed
    pub fn ack(&self, worker: &WorkerId) -> Option<Job> {
        let mut state = self.state.lock();
        let job = state.ack(worker)?;

        self.observability.emit(BrokerEvent::Succeeded {
            worker: worker.clone(),
            job: job.clone(),
            at: Utc::now(),
        });
        Some(job)
    }

    /// Record a failed attempt for the job in flight for `worker` and route it
    /// to the retry queue or, once over budget, to the dead-letter queue
    pub fn nack(&self, worker: &WorkerId) -> Option<NackOutcome> {
        let mut state = self.state.lock();
        let outcome = state.nack(worker, self.config.max_retry)?;

        let now = Utc::now();
        self.observability.emit(BrokerEvent::Failed {
            worker: worker.clone(),
            job: outcome.job().clone(),
            at: now,
        });

        let routed = match &outcome {
            NackOutcome::Retrying(job) => BrokerEvent::RetryScheduled {
                job: job.clone(),
                delay_ms: u64::try_from(self.config.retry_delay.as_millis()).unwrap_or(u64::MAX),
                at: now,
            },
            NackOutcome::DeadLettered(job) => BrokerEvent::DeadLettered {
                job: job.clone(),
                max_retry: self.config.max_retry,
                at: now,
            },
        };
        self.observability.emit(routed);

        Some(outcome)
    }

    /// Move at most one job from the head of the retry queue to the queue tail
    pub fn retry_tick(&self) -> Option<Job> {
        let mut state = self.state.lock();
        let job = state.retry_tick()?;

        self.observability.emit(BrokerEvent::Requeued { job: job.clone(), at: Utc::now() });
        Some(job)
    }

    /// True when nothing is queued, retry-queued or in flight
    pub fn is_idle(&self) -> bool {
        self.state.lock().is_idle()
    }

    /// Run every worker until the broker drains, then report dead letters.
    ///
    /// Starts the retry requeuer, runs one loop per worker concurrently and
    /// stops the requeuer once all loops have finished. A panicking worker
    /// aborts the remaining loops and surfaces as
    /// [`BrokerError::WorkerPanicked`].
    #[instrument(skip(self), fields(broker = %self.config.name, workers = self.workers.len()))]
    pub async fn run(&self) -> BrokerResult<BrokerReport> {
        info!("{} start operating", self.config.name);

        let requeuer = RetryRequeuer::new(self.clone()).start();

        let mut abort_handles = Vec::with_capacity(self.workers.len());
        let mut loops = FuturesUnordered::new();
        for worker in &self.workers {
            let id = worker.id().clone();
            let handle = tokio::spawn(
                WorkerLoop::new(self.clone(), worker.clone())
                    .run()
                    .in_current_span(),
            );
            abort_handles.push(handle.abort_handle());
            loops.push(async move { (id, handle.await) });
        }

        let mut failure = None;
        while let Some((worker, joined)) = loops.next().await {
            if let Err(e) = joined {
                error!(worker = %worker, "Worker loop terminated abnormally: {}", e);
                failure = Some(BrokerError::WorkerPanicked {
                    worker: worker.to_string(),
                    reason: e.to_string(),
                });
                abort_handles.iter().for_each(|handle| handle.abort());
                break;
            }
        }

        requeuer.shutdown().await?;
        if let Some(err) = failure {
            return Err(err);
        }

        let state = self.state.lock();
        let report = self.report_from(&state);
        self.observability.emit(BrokerEvent::Closed {
            broker: report.broker.clone(),
            address: report.address.clone(),
            dead_letters: report.dead_letters.clone(),
            at: Utc::now(),
        });

        Ok(report)
    }

    /// Dead letters and accounting, read under one lock
    pub fn report(&self) -> BrokerReport {
        self.report_from(&self.state.lock())
    }

    fn report_from(&self, state: &BrokerState) -> BrokerReport {
        BrokerReport {
            broker: self.config.name.clone(),
            address: self.config.address.clone(),
            dead_letters: state.dead_letters().iter().map(DeadLetterEntry::from).collect(),
            snapshot: state.snapshot(),
        }
    }

    /// Current job accounting
    pub fn snapshot(&self) -> BrokerSnapshot {
        self.state.lock().snapshot()
    }

    /// Locate a tracked job; acknowledged jobs are no longer tracked
    pub fn state_of(&self, job_id: &JobId) -> Option<JobState> {
        self.state.lock().state_of(job_id)
    }

    /// Jobs waiting for delivery, head first
    pub fn queued(&self) -> Vec<Job> {
        self.state.lock().queue().iter().cloned().collect()
    }

    /// Jobs waiting for a requeue tick, head first
    pub fn retry_queued(&self) -> Vec<Job> {
        self.state.lock().retry_queue().iter().cloned().collect()
    }

    /// Jobs that exhausted their retry budget
    pub fn dead_letters(&self) -> Vec<Job> {
        self.state.lock().dead_letters().to_vec()
    }

    /// In-flight registry, ordered by worker id
    pub fn in_flight(&self) -> Vec<(WorkerId, Job)> {
        let mut entries: Vec<_> = self
            .state
            .lock()
            .in_flight()
            .iter()
            .map(|(worker, job)| (worker.clone(), job.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Subscribe to broker events
    pub fn subscribe(&self) -> BoxStream<BrokerEvent> {
        self.observability.subscribe()
    }

    pub fn metrics(&self) -> &LiveMetrics {
        self.observability.metrics()
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Identities of the registered workers, in registration order
    pub fn worker_ids(&self) -> Vec<WorkerId> {
        self.workers.iter().map(|worker| worker.id().clone()).collect()
    }

    fn emit_delivered(&self, worker: &WorkerId, job: &Job) {
        self.observability.emit(BrokerEvent::Delivered {
            worker: worker.clone(),
            job: job.clone(),
            at: Utc::now(),
        });
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new(BrokerConfig::default())
    }
}

impl fmt::Debug for Broker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broker")
            .field("config", &self.config)
            .field("workers", &self.worker_ids())
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tracing_test::traced_test;
    use crate::observability::RecordingObserver;
    use crate::worker::{AlwaysFail, NeverFail, Worker};

    #[test]
    fn test_deliver_ack_emits_events() {
        let recorder = RecordingObserver::new();
        let broker = Broker::default().with_observer(recorder.clone());
        let worker = WorkerId::from("Dalton");

        broker.submit(Job::new("Customer 1", "Lion"));
        let job = broker.deliver(&worker).unwrap();
        assert_eq!(broker.in_flight(), vec![(worker.clone(), job.clone())]);

        let acked = broker.ack(&worker).unwrap();
        assert_eq!(acked.id(), job.id());
        assert!(broker.is_idle());
        assert_eq!(recorder.event_names(), vec!["submitted", "delivered", "succeeded"]);
        assert_eq!(broker.metrics().jobs_acknowledged(), 1);
    }

    #[test]
    fn test_nack_emits_failure_then_routing() {
        let recorder = RecordingObserver::new();
        let broker = Broker::new(BrokerConfig::default().with_max_retry(0)).with_observer(recorder.clone());
        let worker = WorkerId::from("Wapol");

        broker.submit(Job::new("Unlucky", "Crocodile"));
        broker.deliver(&worker).unwrap();
        let outcome = broker.nack(&worker).unwrap();

        assert!(outcome.is_dead_lettered());
        assert_eq!(
            recorder.event_names(),
            vec!["submitted", "delivered", "failed", "dead_lettered"]
        );
    }

    #[test]
    fn test_operations_without_in_flight_entry_emit_nothing() {
        let recorder = RecordingObserver::new();
        let broker = Broker::default().with_observer(recorder.clone());
        let worker = WorkerId::from("Nobody");

        assert!(broker.ack(&worker).is_none());
        assert!(broker.nack(&worker).is_none());
        assert!(broker.retry_tick().is_none());
        assert!(broker.deliver(&worker).is_none());
        assert!(recorder.events().is_empty());
    }

    #[test]
    fn test_retry_scheduled_carries_delay() {
        let recorder = RecordingObserver::new();
        let broker = Broker::default().with_observer(recorder.clone());
        let worker = WorkerId::from("Dalton");

        broker.submit(Job::new("Retry Guy", "Cat"));
        broker.deliver(&worker).unwrap();
        broker.nack(&worker).unwrap();

        let scheduled = recorder
            .events()
            .into_iter()
            .find_map(|event| match event {
                BrokerEvent::RetryScheduled { delay_ms, job, .. } => Some((delay_ms, job.attempts())),
                _ => None,
            })
            .unwrap();
        assert_eq!(scheduled, (3000, 1));
    }

    #[test]
    fn test_retry_delay_saturates_in_event() {
        let recorder = RecordingObserver::new();
        let config = BrokerConfig::default().with_retry_delay(Duration::MAX);
        let broker = Broker::new(config).with_observer(recorder.clone());
        let worker = WorkerId::from("Dalton");

        broker.submit(Job::new("Retry Guy", "Cat"));
        broker.deliver(&worker).unwrap();
        broker.nack(&worker).unwrap();

        let delay = recorder.events().into_iter().find_map(|event| match event {
            BrokerEvent::RetryScheduled { delay_ms, .. } => Some(delay_ms),
            _ => None,
        });
        assert_eq!(delay, Some(u64::MAX));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_carries_address() {
        let recorder = RecordingObserver::new();
        let config = BrokerConfig::default()
            .with_name("Third Service Center")
            .with_address("Jalan Ahmad Yani 9");
        let broker = Broker::new(config)
            .with_observer(recorder.clone())
            .with_worker(Worker::new("Dalton", Duration::from_secs(1)).with_failure_policy(NeverFail))
            .with_jobs([Job::new("Customer 1", "Lion")]);

        let report = broker.run().await.unwrap();
        assert_eq!(report.address.as_deref(), Some("Jalan Ahmad Yani 9"));

        match recorder.events().last() {
            Some(BrokerEvent::Closed { broker, address, .. }) => {
                assert_eq!(broker, "Third Service Center");
                assert_eq!(address.as_deref(), Some("Jalan Ahmad Yani 9"));
            }
            other => panic!("Expected Closed event, got: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_without_workers_returns_immediately() {
        let broker = Broker::default().with_jobs([Job::new("Orphan", "Lion")]);

        let report = broker.run().await.unwrap();
        assert!(report.dead_letters.is_empty());
        assert_eq!(report.snapshot.queued, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_on_empty_broker() {
        let worker = Arc::new(Worker::new("Idle Tech", Duration::ZERO).with_failure_policy(NeverFail));
        let broker = Broker::default().with_shared_worker(worker.clone());

        let report = broker.run().await.unwrap();
        assert!(report.snapshot.is_idle());
        assert!(!worker.is_busy());
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_dead_letter_is_narrated() {
        let broker = Broker::default()
            .with_worker(Worker::new("Tech Fail", Duration::from_secs(1)).with_failure_policy(AlwaysFail))
            .with_jobs([Job::new("Unlucky", "Crocodile")]);

        let report = broker.run().await.unwrap();

        assert_eq!(report.dead_letters.len(), 1);
        assert!(logs_contain("Unlucky exceeded retry limit. Sent to DLQ"));
        assert!(logs_contain("Retrying Unlucky in 3s"));
    }

    struct Panicking(WorkerId);

    #[async_trait::async_trait]
    impl Processor for Panicking {
        fn id(&self) -> &WorkerId {
            &self.0
        }

        async fn process(&self, _job: &Job) -> Result<(), crate::JobError> {
            panic!("processor blew up");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_worker_surfaces_error() {
        let broker = Broker::default()
            .with_worker(Panicking(WorkerId::from("Broken")))
            .with_worker(Worker::new("Steady", Duration::from_secs(1)).with_failure_policy(NeverFail))
            .with_jobs([Job::new("Customer 1", "Lion"), Job::new("Customer 2", "Cat")]);

        let err = broker.run().await.unwrap_err();
        assert!(matches!(err, BrokerError::WorkerPanicked { ref worker, .. } if worker == "Broken"));
    }
}
