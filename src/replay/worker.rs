//! Pull-mode replay loop.

use std::sync::Arc;

use crate::config::WorkerConfig;
use crate::lifecycle::shutdown::ShutdownSignal;
use crate::queue::{QueueClient, QueueError};
use crate::replay::Replayer;
use crate::resilience::calculate_backoff;

/// Consumes one stream and replays every envelope it receives.
pub struct ReplayWorker {
    name: String,
    queue: Arc<dyn QueueClient>,
    stream: String,
    replayer: Replayer,
    backoff_base_ms: u64,
    backoff_max_ms: u64,
}

impl ReplayWorker {
    pub fn new(
        name: impl Into<String>,
        queue: Arc<dyn QueueClient>,
        stream: impl Into<String>,
        replayer: Replayer,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            name: name.into(),
            queue,
            stream: stream.into(),
            replayer,
            backoff_base_ms: config.receive_backoff_base_ms,
            backoff_max_ms: config.receive_backoff_max_ms,
        }
    }

    /// Loop until `shutdown` fires. An envelope already received when the
    /// signal arrives is still replayed and acknowledged.
    pub async fn run(self, mut shutdown: ShutdownSignal) {
        tracing::info!(worker = %self.name, stream = %self.stream, "Replay worker started");
        let mut failures: u32 = 0;

        loop {
            let received = tokio::select! {
                _ = shutdown.recv() => break,
                received = self.queue.receive_next(&self.stream) => received,
            };

            match received {
                Ok(delivery) => {
                    failures = 0;
                    self.replayer.handle(&delivery.envelope).await;
                    self.ack(&delivery.receipt).await;
                }
                Err(QueueError::CorruptEntry { receipt, reason }) => {
                    failures = 0;
                    tracing::warn!(worker = %self.name, receipt = %receipt, reason = %reason, "Skipping corrupt queue entry");
                    self.ack(&receipt).await;
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    let delay = calculate_backoff(failures, self.backoff_base_ms, self.backoff_max_ms);
                    tracing::error!(
                        worker = %self.name,
                        error = %e,
                        attempt = failures,
                        delay = ?delay,
                        "Failed to receive from queue"
                    );
                    tokio::select! {
                        _ = shutdown.recv() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        tracing::info!(worker = %self.name, "Replay worker stopped");
    }

    async fn ack(&self, receipt: &str) {
        if let Err(e) = self.queue.ack(&self.stream, receipt).await {
            tracing::warn!(worker = %self.name, receipt = %receipt, error = %e, "Failed to acknowledge; entry may be redelivered");
        }
    }
}
