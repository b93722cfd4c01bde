//! Optional subscriber setup for binaries embedding the broker.

#[cfg(feature = "tracing-basic")]
use crate::{BrokerError, BrokerResult};

/// Install a global fmt subscriber.
///
/// `RUST_LOG` wins over `default_filter` when set.
#[cfg(feature = "tracing-basic")]
pub fn init_tracing(default_filter: &str) -> BrokerResult<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .map_err(|e| BrokerError::Tracing(e.to_string()))?;

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| BrokerError::Tracing(e.to_string()))
}
