pub mod layer;
pub mod metrics;
pub mod observer;
pub mod tracing;

pub use layer::{BoxStream, ObservabilityLayer};
pub use metrics::{LiveMetrics, MetricsSnapshot};
pub use observer::{BrokerObserver, RecordingObserver};

#[cfg(feature = "tracing-basic")]
pub use self::tracing::init_tracing;
