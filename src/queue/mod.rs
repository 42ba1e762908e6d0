//! Queue hand-off subsystem.
//!
//! # Data Flow
//! ```text
//! Producer (ingress):
//!     Envelope { id, request }
//!     → QueueClient::append(stream, envelope)
//!     → durable log (redis.rs: XADD) or memory.rs
//!
//! Consumer (replay worker):
//!     QueueClient::receive_next(stream)   (blocks)
//!     → Delivery { receipt, envelope }
//!     → replay
//!     → QueueClient::ack(stream, receipt)
//! ```
//!
//! # Design Decisions
//! - At-least-once: an envelope stays pending until acknowledged
//! - The client is a narrow trait held as `Arc<dyn QueueClient>` by both
//!   the dispatcher and the worker, never a global
//! - Backend errors are classified as unavailable (transport) or rejected
//!   (the log refused the command)

pub mod envelope;
pub mod id;
pub mod memory;
pub mod redis;
pub mod resp;

use async_trait::async_trait;
use thiserror::Error;

pub use envelope::Envelope;
pub use id::{IdGenerator, TimeOrderedIds};
pub use memory::MemoryQueue;
pub use redis::RedisStreamQueue;

/// Errors reported by queue backends.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The log could not be reached.
    #[error("queue unavailable: {0}")]
    Unavailable(String),

    /// The log refused the command (missing stream, wrong type, auth...).
    #[error("queue rejected command: {0}")]
    Rejected(String),

    /// A stored entry could not be read as an envelope.
    #[error("queue entry {receipt} is not a valid envelope: {reason}")]
    CorruptEntry { receipt: String, reason: String },
}

impl QueueError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            QueueError::Unavailable(_) => "unavailable",
            QueueError::Rejected(_) => "rejected",
            QueueError::CorruptEntry { .. } => "corrupt_entry",
        }
    }
}

/// An envelope handed to a consumer, with the receipt needed to ack it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub receipt: String,
    pub envelope: Envelope,
}

/// Append/consume capability over an ordered durable log.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Persist an envelope at the tail of `stream`. Returns once the log has
    /// confirmed the write.
    async fn append(&self, stream: &str, envelope: &Envelope) -> Result<(), QueueError>;

    /// Wait for the next envelope on `stream`.
    ///
    /// Envelopes that were delivered but never acknowledged may be delivered
    /// again.
    async fn receive_next(&self, stream: &str) -> Result<Delivery, QueueError>;

    /// Mark a delivery as done so it is not delivered again.
    async fn ack(&self, stream: &str, receipt: &str) -> Result<(), QueueError>;
}
