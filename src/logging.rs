//! Tracing subscriber setup for binaries and tests embedding the engine

use crate::error::{RankFuseError, Result};
use tracing_subscriber::{fmt, EnvFilter};

/// Filter used when `RUST_LOG` is unset or invalid
pub const DEFAULT_FILTER: &str = "rankfuse=info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global fmt subscriber
///
/// Panics if a global subscriber is already set; use [`try_init_logging`]
/// when that may happen.
pub fn init_logging() {
    fmt().with_env_filter(env_filter()).with_target(false).init();
}

/// Install the global fmt subscriber, failing if one is already set
pub fn try_init_logging() -> Result<()> {
    fmt()
        .with_env_filter(env_filter())
        .with_target(false)
        .try_init()
        .map_err(|e| RankFuseError::Config(format!("Failed to initialize logging: {}", e)))
}
