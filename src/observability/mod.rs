//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher and workers produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → stdout (fmt layer, filtered by RUST_LOG or the configured level)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Request ID (`x-request-id`) and envelope ID are logged as fields
//! - Metrics go through the `metrics` facade; without an installed
//!   recorder every call is a no-op

pub mod logging;
pub mod metrics;
