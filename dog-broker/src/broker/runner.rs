use std::sync::Arc;
use tracing::{debug, instrument};

use super::Delivery;
use crate::{Broker, Job, Processor, WorkerId};

/// Processing loop for a single worker
pub(crate) struct WorkerLoop {
    broker: Broker,
    worker: Arc<dyn Processor>,
}

impl WorkerLoop {
    pub(crate) fn new(broker: Broker, worker: Arc<dyn Processor>) -> Self {
        Self { broker, worker }
    }

    /// Pull and process jobs until the broker drains
    #[instrument(skip(self), fields(worker = %self.worker.id()))]
    pub(crate) async fn run(self) {
        let id = self.worker.id().clone();
        let backoff = self.broker.config().idle_backoff;

        loop {
            match self.broker.next_delivery(&id) {
                Delivery::Job(job) => self.process(&id, job).await,
                Delivery::Pending => {
                    debug!("Nothing deliverable, backing off for {:?}", backoff);
                    tokio::time::sleep(backoff).await;
                }
                Delivery::Drained => break,
            }
        }

        debug!("Worker loop finished");
    }

    async fn process(&self, id: &WorkerId, job: Job) {
        match self.worker.process(&job).await {
            Ok(()) => {
                self.broker.ack(id);
            }
            Err(e) => {
                debug!("Nacking after failure: {}", e);
                self.broker.nack(id);
            }
        }
    }
}
