//! Logging setup and relay metrics.

pub mod metrics;

pub use metrics::RelayMetrics;

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global fmt subscriber. Respects `RUST_LOG`, defaults to `info`.
pub fn init_tracing() -> anyhow::Result<()> {
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("setting default subscriber failed: {e}"))
}
