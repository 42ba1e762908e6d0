//! In-process queue backend.
//!
//! Used by the all-in-one command and as a test double. Entries are held in
//! a FIFO per stream; delivered entries move to a pending set until acked.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::Notify;

use super::{Delivery, Envelope, QueueClient, QueueError};

#[derive(Debug, Default)]
struct Stream {
    next_seq: u64,
    ready: VecDeque<Delivery>,
    pending: HashMap<String, Envelope>,
}

/// A [`QueueClient`] backed by process memory.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    streams: Mutex<HashMap<String, Stream>>,
    appended: Notify,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries waiting to be delivered.
    pub fn ready_len(&self, stream: &str) -> usize {
        self.with_streams(|streams| streams.get(stream).map_or(0, |s| s.ready.len()))
    }

    /// Entries delivered but not yet acknowledged.
    pub fn pending_len(&self, stream: &str) -> usize {
        self.with_streams(|streams| streams.get(stream).map_or(0, |s| s.pending.len()))
    }

    /// Put every unacknowledged entry back at the head of the stream, as a
    /// durable log does for a consumer that crashed before acking.
    pub fn redeliver_pending(&self, stream: &str) {
        self.with_streams(|streams| {
            if let Some(s) = streams.get_mut(stream) {
                let mut pending: Vec<Delivery> = s
                    .pending
                    .drain()
                    .map(|(receipt, envelope)| Delivery { receipt, envelope })
                    .collect();
                pending.sort_by(|a, b| b.receipt.cmp(&a.receipt));
                for delivery in pending {
                    s.ready.push_front(delivery);
                }
            }
        });
        self.appended.notify_waiters();
    }

    fn with_streams<R>(&self, f: impl FnOnce(&mut HashMap<String, Stream>) -> R) -> R {
        let mut streams = self.streams.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut streams)
    }

    fn try_take(&self, stream: &str) -> Option<Delivery> {
        self.with_streams(|streams| {
            let s = streams.get_mut(stream)?;
            let delivery = s.ready.pop_front()?;
            s.pending
                .insert(delivery.receipt.clone(), delivery.envelope.clone());
            Some(delivery)
        })
    }
}

#[async_trait]
impl QueueClient for MemoryQueue {
    async fn append(&self, stream: &str, envelope: &Envelope) -> Result<(), QueueError> {
        self.with_streams(|streams| {
            let s = streams.entry(stream.to_string()).or_default();
            s.next_seq += 1;
            // Zero-padded so receipts sort in append order.
            let receipt = format!("{:020}-0", s.next_seq);
            s.ready.push_back(Delivery {
                receipt,
                envelope: envelope.clone(),
            });
        });
        self.appended.notify_waiters();
        Ok(())
    }

    async fn receive_next(&self, stream: &str) -> Result<Delivery, QueueError> {
        loop {
            // Register interest before checking so an append in between is not missed.
            let notified = self.appended.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(delivery) = self.try_take(stream) {
                return Ok(delivery);
            }
            notified.await;
        }
    }

    async fn ack(&self, stream: &str, receipt: &str) -> Result<(), QueueError> {
        self.with_streams(|streams| {
            if let Some(s) = streams.get_mut(stream) {
                s.pending.remove(receipt);
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn envelope(id: &str) -> Envelope {
        Envelope {
            id: id.to_string(),
            payload: format!("GET /{id} HTTP/1.1\r\nhost: h\r\n\r\n"),
        }
    }

    #[tokio::test]
    async fn test_fifo_and_ack() {
        let queue = MemoryQueue::new();
        queue.append("s", &envelope("a")).await.unwrap();
        queue.append("s", &envelope("b")).await.unwrap();

        let first = queue.receive_next("s").await.unwrap();
        let second = queue.receive_next("s").await.unwrap();
        assert_eq!(first.envelope.id, "a");
        assert_eq!(second.envelope.id, "b");
        assert!(first.receipt < second.receipt);
        assert_eq!(queue.pending_len("s"), 2);

        queue.ack("s", &first.receipt).await.unwrap();
        queue.ack("s", &second.receipt).await.unwrap();
        assert_eq!(queue.pending_len("s"), 0);
        assert_eq!(queue.ready_len("s"), 0);
    }

    #[tokio::test]
    async fn test_streams_are_independent() {
        let queue = MemoryQueue::new();
        queue.append("one", &envelope("a")).await.unwrap();
        assert_eq!(queue.ready_len("one"), 1);
        assert_eq!(queue.ready_len("two"), 0);
    }

    #[tokio::test]
    async fn test_receive_blocks_until_append() {
        let queue = Arc::new(MemoryQueue::new());
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.receive_next("s").await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!consumer.is_finished());

        queue.append("s", &envelope("late")).await.unwrap();
        let delivery = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(delivery.envelope.id, "late");
    }

    #[tokio::test]
    async fn test_unacked_entries_are_redelivered() {
        let queue = MemoryQueue::new();
        queue.append("s", &envelope("a")).await.unwrap();
        queue.append("s", &envelope("b")).await.unwrap();

        let a = queue.receive_next("s").await.unwrap();
        let _b = queue.receive_next("s").await.unwrap();
        queue.ack("s", &a.receipt).await.unwrap();

        queue.redeliver_pending("s");
        let again = queue.receive_next("s").await.unwrap();
        assert_eq!(again.envelope.id, "b");
    }
}
