//! Replay subsystem.
//!
//! # Data Flow
//! ```text
//! pull (worker.rs):   QueueClient::receive_next ─┐
//! push (push.rs):     POST / CloudEvent ─────────┤
//!                                                ▼
//!                     replayer.rs: decode → strip Prefer → address from Host
//!                                  → send → drain response
//!                                                │
//! pull only:          QueueClient::ack ◀─────────┘
//! ```
//!
//! # Design Decisions
//! - Malformed payloads and unreachable destinations are dropped, never
//!   retried or requeued
//! - Every received entry is acknowledged once handled, including drops
//! - Queue read failures back off exponentially and never stop the loop

pub mod push;
pub mod replayer;
pub mod worker;

pub use replayer::{ReplayError, Replayer};
pub use worker::ReplayWorker;
