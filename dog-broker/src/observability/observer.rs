use std::sync::Arc;
use parking_lot::Mutex;

use crate::BrokerEvent;

/// Caller-supplied narration sink.
///
/// Called synchronously after each broker transition, outside the broker lock.
/// Any `Fn(&BrokerEvent)` closure is an observer.
pub trait BrokerObserver: Send + Sync {
    fn on_event(&self, event: &BrokerEvent);
}

impl<F> BrokerObserver for F
where
    F: Fn(&BrokerEvent) + Send + Sync,
{
    fn on_event(&self, event: &BrokerEvent) {
        self(event)
    }
}

/// Observer that keeps every event in memory
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    events: Arc<Mutex<Vec<BrokerEvent>>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get recorded events in emission order
    pub fn events(&self) -> Vec<BrokerEvent> {
        self.events.lock().clone()
    }

    /// Get the names of recorded events in emission order
    pub fn event_names(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(BrokerEvent::event_name).collect()
    }

    /// Count recorded events with the given name
    pub fn count(&self, event_name: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| event.event_name() == event_name)
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl BrokerObserver for RecordingObserver {
    fn on_event(&self, event: &BrokerEvent) {
        self.events.lock().push(event.clone());
    }
}
