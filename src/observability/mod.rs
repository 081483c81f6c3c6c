//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (fmt layer)
//!     → optional Prometheus scrape endpoint
//! ```
//!
//! # Design Decisions
//! - Request id flows through all log lines of a request
//! - Metrics are no-ops unless an exporter is installed

pub mod logging;
pub mod metrics;
