//! # Observability
//!
//! Structured logging setup and Prometheus metrics.

pub mod metrics;

use crate::constants::DEFAULT_LOG_FILTER;

/// Install the global tracing subscriber
///
/// `RUST_LOG` overrides the default filter. Returns an error if a subscriber
/// is already installed.
#[allow(
    clippy::missing_errors_doc,
    reason = "Only fails when called twice in one process"
)]
pub fn init_tracing(default_filter: Option<&str>) -> anyhow::Result<()> {
    let fallback = default_filter.unwrap_or(DEFAULT_LOG_FILTER).to_string();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback.into()),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {e}"))
}
