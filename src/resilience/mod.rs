//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Worker receive fails (queue unreachable):
//!     → backoff.rs (exponential delay with jitter)
//!     → sleep, then receive again
//! ```
//!
//! # Design Decisions
//! - Replays are never retried; only the worker's own queue reads back off
//! - Attempt counter resets after the first successful receive

pub mod backoff;

pub use backoff::calculate_backoff;
