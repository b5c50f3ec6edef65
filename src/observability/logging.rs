//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber once per process
//! - Translate the daemon's `LOG_LEVEL` into an `EnvFilter`

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogLevel;

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `level` when it is set and parses.
pub fn init(level: LogLevel) {
    tracing_subscriber::registry()
        .with(filter_for(level))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

fn filter_for(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| level.filter_directive().into())
}
