//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config → queue clients → bind listeners → spawn tasks
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     broadcast → ingress stops accepting and drains (axum graceful shutdown)
//!               → worker loops finish their current envelope and exit
//!               → push receiver stops accepting
//! ```
//!
//! # Design Decisions
//! - One broadcast coordinator per process, subscribed by every long-running task
//! - An envelope being replayed when shutdown arrives is finished and acked

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{Shutdown, ShutdownSignal};
pub use signals::trigger_on_signal;
