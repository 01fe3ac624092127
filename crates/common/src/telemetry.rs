//! Logging initialization.
//!
//! Library code only emits `tracing` events; binaries and tests call
//! [`init_tracing`] once to route them to stdout.

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Install a stdout subscriber. `RUST_LOG` wins over `default_filter`.
/// Installing twice is not an error; the first subscriber stays.
pub fn init_tracing(default_filter: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))?;

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_filter(filter);

    tracing_subscriber::registry().with(stdout_layer).try_init().ok();
    Ok(())
}

/// JSON variant for log shippers.
pub fn init_json_tracing(default_filter: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))?;

    let json_layer = tracing_subscriber::fmt::layer().json().with_filter(filter);

    tracing_subscriber::registry().with(json_layer).try_init().ok();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_tracing("shardline=debug").unwrap();
        init_tracing("shardline=debug").unwrap();
    }
}
