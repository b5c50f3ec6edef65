//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! device, control plane, lifecycle
//!     → logging.rs (structured tracing events, filtered by LOG_LEVEL)
//!     → metrics.rs (packet counters, queue depth, shutdown reasons)
//! ```
//!
//! # Design Decisions
//! - Log level comes from the daemon environment, `RUST_LOG` overrides it
//! - Metrics are recorded unconditionally; without an installed recorder they cost nothing

pub mod logging;
pub mod metrics;
