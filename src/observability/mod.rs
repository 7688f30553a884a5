//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout via tracing-subscriber fmt layer
//!     → Prometheus scrape endpoint
//! ```
//!
//! # Design Decisions
//! - Structured fields on every event (method, path, upstream, state)
//! - Request ID flows through all subsystems
//! - Metric calls are no-ops until a recorder is installed

pub mod logging;
pub mod metrics;
