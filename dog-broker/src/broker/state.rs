use std::collections::{HashMap, VecDeque};

use crate::{BrokerSnapshot, Job, JobId, JobState, WorkerId};

/// What a worker loop should do next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// A job was moved in flight for this worker
    Job(Job),

    /// Nothing deliverable right now, but work is still queued or in flight
    Pending,

    /// Nothing is queued, retry-queued or in flight
    Drained,
}

/// Routing decision taken by a negative acknowledgment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NackOutcome {
    /// Parked at the tail of the retry queue
    Retrying(Job),

    /// Attempts exceeded the retry budget
    DeadLettered(Job),
}

impl NackOutcome {
    pub fn job(&self) -> &Job {
        match self {
            Self::Retrying(job) | Self::DeadLettered(job) => job,
        }
    }

    pub fn is_dead_lettered(&self) -> bool {
        matches!(self, Self::DeadLettered(_))
    }
}

/// Broker collections. Always accessed under the broker mutex.
#[derive(Debug, Default)]
pub(crate) struct BrokerState {
    queue: VecDeque<Job>,
    retry_queue: VecDeque<Job>,
    dead_letters: Vec<Job>,
    in_flight: HashMap<WorkerId, Job>,
    submitted: u64,
    acknowledged: u64,
}

impl BrokerState {
    pub(crate) fn submit(&mut self, job: Job) {
        self.submitted += 1;
        self.queue.push_back(job);
    }

    pub(crate) fn deliver(&mut self, worker: &WorkerId) -> Option<Job> {
        if self.queue.is_empty() || self.in_flight.contains_key(worker) {
            return None;
        }

        let job = self.queue.pop_front()?;
        self.in_flight.insert(worker.clone(), job.clone());
        Some(job)
    }

    /// Deliver, or report whether the broker has drained, in one step
    pub(crate) fn next_delivery(&mut self, worker: &WorkerId) -> Delivery {
        match self.deliver(worker) {
            Some(job) => Delivery::Job(job),
            None if self.is_idle() => Delivery::Drained,
            None => Delivery::Pending,
        }
    }

    pub(crate) fn ack(&mut self, worker: &WorkerId) -> Option<Job> {
        let job = self.in_flight.remove(worker)?;
        self.acknowledged += 1;
        Some(job)
    }

    pub(crate) fn nack(&mut self, worker: &WorkerId, max_retry: u32) -> Option<NackOutcome> {
        let mut job = self.in_flight.remove(worker)?;

        if job.record_failure() > max_retry {
            self.dead_letters.push(job.clone());
            Some(NackOutcome::DeadLettered(job))
        } else {
            self.retry_queue.push_back(job.clone());
            Some(NackOutcome::Retrying(job))
        }
    }

    pub(crate) fn retry_tick(&mut self) -> Option<Job> {
        let job = self.retry_queue.pop_front()?;
        self.queue.push_back(job.clone());
        Some(job)
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.retry_queue.is_empty() && self.in_flight.is_empty()
    }

    pub(crate) fn state_of(&self, job_id: &JobId) -> Option<JobState> {
        if self.queue.iter().any(|job| job.id() == job_id) {
            return Some(JobState::Queued);
        }
        if self.retry_queue.iter().any(|job| job.id() == job_id) {
            return Some(JobState::RetryQueued);
        }
        if let Some((worker, _)) = self.in_flight.iter().find(|(_, job)| job.id() == job_id) {
            return Some(JobState::InFlight { worker: worker.clone() });
        }
        if self.dead_letters.iter().any(|job| job.id() == job_id) {
            return Some(JobState::DeadLettered);
        }
        None
    }

    pub(crate) fn snapshot(&self) -> BrokerSnapshot {
        BrokerSnapshot {
            submitted: self.submitted,
            queued: self.queue.len(),
            retry_queued: self.retry_queue.len(),
            in_flight: self.in_flight.len(),
            dead_lettered: self.dead_letters.len(),
            acknowledged: self.acknowledged,
        }
    }

    pub(crate) fn queue(&self) -> &VecDeque<Job> {
        &self.queue
    }

    pub(crate) fn retry_queue(&self) -> &VecDeque<Job> {
        &self.retry_queue
    }

    pub(crate) fn dead_letters(&self) -> &[Job] {
        &self.dead_letters
    }

    pub(crate) fn in_flight(&self) -> &HashMap<WorkerId, Job> {
        &self.in_flight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const MAX_RETRY: u32 = 3;

    fn worker(name: &str) -> WorkerId {
        WorkerId::from(name)
    }

    #[test]
    fn test_deliver_pops_head_in_fifo_order() {
        let mut state = BrokerState::default();
        let first = Job::new("Alice", "Lion");
        let second = Job::new("Bob", "Tiger");
        state.submit(first.clone());
        state.submit(second.clone());

        assert_eq!(state.deliver(&worker("A")), Some(first));
        assert_eq!(state.deliver(&worker("B")), Some(second));
        assert_eq!(state.deliver(&worker("C")), None);
    }

    #[test]
    fn test_deliver_refuses_worker_with_job_in_flight() {
        let mut state = BrokerState::default();
        state.submit(Job::new("Alice", "Lion"));
        state.submit(Job::new("Bob", "Tiger"));

        assert!(state.deliver(&worker("A")).is_some());
        assert_eq!(state.deliver(&worker("A")), None);
        assert_eq!(state.queue().len(), 1);
        assert_eq!(state.in_flight().len(), 1);
    }

    #[test]
    fn test_ack_and_nack_without_entry_are_noops() {
        let mut state = BrokerState::default();
        state.submit(Job::new("Alice", "Lion"));

        assert_eq!(state.ack(&worker("A")), None);
        assert_eq!(state.nack(&worker("A"), MAX_RETRY), None);
        assert_eq!(state.snapshot().queued, 1);
        assert_eq!(state.snapshot().acknowledged, 0);
    }

    #[test]
    fn test_nack_routes_to_retry_queue_then_dead_letters() {
        let mut state = BrokerState::default();
        let job = Job::new("Unlucky", "Crocodile");
        let id = job.id().clone();
        state.submit(job);

        for expected in 1..=MAX_RETRY {
            state.deliver(&worker("A")).unwrap();
            let outcome = state.nack(&worker("A"), MAX_RETRY).unwrap();
            assert!(!outcome.is_dead_lettered());
            assert_eq!(outcome.job().attempts(), expected);
            assert_eq!(state.state_of(&id), Some(JobState::RetryQueued));
            assert!(state.retry_tick().is_some());
        }

        state.deliver(&worker("A")).unwrap();
        let outcome = state.nack(&worker("A"), MAX_RETRY).unwrap();
        assert!(outcome.is_dead_lettered());
        assert_eq!(outcome.job().attempts(), MAX_RETRY + 1);
        assert_eq!(state.state_of(&id), Some(JobState::DeadLettered));
        assert!(state.is_idle());
    }

    #[test]
    fn test_retry_tick_moves_one_job_per_call() {
        let mut state = BrokerState::default();
        for name in ["C1", "C2", "C3"] {
            state.submit(Job::new(name, "Eagle"));
        }
        for name in ["A", "B", "C"] {
            state.deliver(&worker(name)).unwrap();
            state.nack(&worker(name), MAX_RETRY).unwrap();
        }
        assert_eq!(state.retry_queue().len(), 3);

        let moved = state.retry_tick().unwrap();
        assert_eq!(moved.name(), "C1");
        assert_eq!(state.retry_queue().len(), 2);
        assert_eq!(state.queue().len(), 1);
    }

    #[test]
    fn test_retry_tick_on_empty_retry_queue() {
        let mut state = BrokerState::default();
        assert_eq!(state.retry_tick(), None);
    }

    #[test]
    fn test_next_delivery_distinguishes_pending_from_drained() {
        let mut state = BrokerState::default();
        assert_eq!(state.next_delivery(&worker("A")), Delivery::Drained);

        state.submit(Job::new("Alice", "Lion"));
        assert!(matches!(state.next_delivery(&worker("A")), Delivery::Job(_)));
        assert_eq!(state.next_delivery(&worker("B")), Delivery::Pending);

        state.nack(&worker("A"), MAX_RETRY).unwrap();
        assert_eq!(state.next_delivery(&worker("A")), Delivery::Pending);

        state.retry_tick().unwrap();
        assert!(matches!(state.next_delivery(&worker("A")), Delivery::Job(_)));
        state.ack(&worker("A")).unwrap();
        assert_eq!(state.next_delivery(&worker("A")), Delivery::Drained);
    }

    #[test]
    fn test_acknowledged_jobs_are_untracked() {
        let mut state = BrokerState::default();
        let job = Job::new("Alice", "Lion");
        let id = job.id().clone();
        state.submit(job);

        state.deliver(&worker("A")).unwrap();
        assert_eq!(state.state_of(&id), Some(JobState::InFlight { worker: worker("A") }));
        state.ack(&worker("A")).unwrap();
        assert_eq!(state.state_of(&id), None);
        assert!(state.snapshot().is_conserved());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Submit,
        Deliver(u8),
        Ack(u8),
        Nack(u8),
        Tick,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Submit),
            (0u8..3).prop_map(Op::Deliver),
            (0u8..3).prop_map(Op::Ack),
            (0u8..3).prop_map(Op::Nack),
            Just(Op::Tick),
        ]
    }

    proptest! {
        #[test]
        fn prop_accounting_invariants_hold(ops in proptest::collection::vec(op(), 0..200)) {
            let mut state = BrokerState::default();
            let mut last_attempts: HashMap<JobId, u32> = HashMap::new();

            for op in ops {
                match op {
                    Op::Submit => state.submit(Job::new("job", "prop")),
                    Op::Deliver(w) => {
                        let id = worker(&w.to_string());
                        let already = state.in_flight().contains_key(&id);
                        let delivered = state.deliver(&id);
                        if already {
                            prop_assert!(delivered.is_none());
                        }
                    }
                    Op::Ack(w) => {
                        state.ack(&worker(&w.to_string()));
                    }
                    Op::Nack(w) => {
                        if let Some(outcome) = state.nack(&worker(&w.to_string()), MAX_RETRY) {
                            let job = outcome.job();
                            let previous = last_attempts.get(job.id()).copied().unwrap_or(0);
                            prop_assert_eq!(job.attempts(), previous + 1);
                            prop_assert_eq!(outcome.is_dead_lettered(), job.attempts() == MAX_RETRY + 1);
                            last_attempts.insert(job.id().clone(), job.attempts());
                        }
                    }
                    Op::Tick => {
                        let before = state.retry_queue().len();
                        state.retry_tick();
                        prop_assert_eq!(state.retry_queue().len(), before.saturating_sub(1));
                    }
                }

                let snapshot = state.snapshot();
                prop_assert!(snapshot.is_conserved());
                prop_assert!(snapshot.in_flight <= 3);
                prop_assert!(state.dead_letters().iter().all(|job| job.attempts() == MAX_RETRY + 1));
            }
        }
    }
}
