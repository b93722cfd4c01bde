pub mod ids;
pub mod job;
pub mod events;
pub mod report;

pub use ids::{JobId, WorkerId};
pub use job::{Job, JobState};
pub use events::BrokerEvent;
pub use report::{BrokerReport, BrokerSnapshot, DeadLetterEntry};
