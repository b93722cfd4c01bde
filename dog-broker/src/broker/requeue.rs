use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, Instrument};

use crate::{Broker, BrokerError, BrokerResult};

/// Periodic task moving retry-queued jobs back into the delivery queue.
///
/// Each tick moves at most one job, so retry throughput is capped at one job
/// per interval regardless of how deep the retry queue is.
pub struct RetryRequeuer {
    broker: Broker,
    interval: Duration,
}

impl RetryRequeuer {
    /// Create a requeuer ticking at the broker's configured retry delay
    pub fn new(broker: Broker) -> Self {
        let interval = broker.config().retry_delay;
        Self { broker, interval }
    }

    /// Create requeuer with custom interval
    pub fn with_interval(broker: Broker, interval: Duration) -> Self {
        Self { broker, interval }
    }

    /// Spawn the ticker. The first tick fires one full interval after start.
    pub fn start(self) -> RequeueHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let join_handle = tokio::spawn(self.run(shutdown_rx).in_current_span());

        RequeueHandle {
            shutdown_tx,
            join_handle,
        }
    }

    async fn run(self, mut shutdown_rx: oneshot::Receiver<()>) {
        // tokio intervals reject a zero period
        let period = self.interval.max(Duration::from_millis(1));
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Starting retry requeuer with interval: {:?}", period);

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    break;
                }

                _ = ticker.tick() => {
                    if self.broker.retry_tick().is_none() {
                        debug!("Retry queue empty");
                    }
                }
            }
        }

        debug!("Retry requeuer stopped");
    }
}

/// Handle for stopping a running requeuer
pub struct RequeueHandle {
    shutdown_tx: oneshot::Sender<()>,
    join_handle: JoinHandle<()>,
}

impl RequeueHandle {
    /// Stop ticking and wait for the task to exit
    pub async fn shutdown(self) -> BrokerResult<()> {
        let _ = self.shutdown_tx.send(());
        self.join_handle
            .await
            .map_err(|e| BrokerError::Requeue(e.to_string()))
    }
}
