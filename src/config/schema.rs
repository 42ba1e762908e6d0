//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct RelayConfig {
    /// Ingress listener configuration.
    pub listener: ListenerConfig,

    /// Dispatcher settings (destination, size limit).
    pub ingress: IngressConfig,

    /// Durable log settings.
    pub queue: QueueConfig,

    /// Replay worker settings.
    pub worker: WorkerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Ingress dispatcher configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct IngressConfig {
    /// Destination `host[:port]`. When unset, the request's own Host header
    /// is used.
    pub destination: Option<String>,

    /// Maximum deferred request body size in bytes.
    pub size_limit: u64,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            destination: None,
            size_limit: 6_000_000,
        }
    }
}

/// Queue backend selection.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackend {
    #[default]
    Redis,
    /// In-process queue; only meaningful when ingress and worker share a
    /// process.
    Memory,
}

/// Durable log configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct QueueConfig {
    pub backend: QueueBackend,

    /// `host:port` or `redis://[:password@]host[:port][/db]`.
    pub address: String,

    /// Logical stream name.
    pub stream: String,

    /// Consumer group shared by all workers.
    pub consumer_group: String,

    /// Consumer name; suffixed with `-<n>` per worker loop.
    pub consumer_name: String,

    /// How long a blocking read waits before re-polling, in milliseconds.
    pub block_ms: u64,

    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::Redis,
            address: "redis://127.0.0.1:6379".to_string(),
            stream: "deferred-requests".to_string(),
            consumer_group: "replay-workers".to_string(),
            consumer_name: "replay-worker".to_string(),
            block_ms: 5000,
            connect_timeout_secs: 5,
        }
    }
}

impl QueueConfig {
    pub fn block(&self) -> Duration {
        Duration::from_millis(self.block_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// How the worker obtains envelopes.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum WorkerMode {
    /// Block on the queue.
    #[default]
    Pull,
    /// Receive CloudEvents over HTTP.
    Push,
}

/// Replay worker configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct WorkerConfig {
    pub mode: WorkerMode,

    /// Number of pull loops in one process.
    pub concurrency: usize,

    /// Bind address of the push receiver.
    pub push_bind_address: String,

    /// Per-replay timeout in seconds (0 = none).
    pub replay_timeout_secs: u64,

    /// Base delay after a failed receive.
    pub receive_backoff_base_ms: u64,

    /// Ceiling for the receive backoff.
    pub receive_backoff_max_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            mode: WorkerMode::Pull,
            concurrency: 1,
            push_bind_address: "0.0.0.0:8081".to_string(),
            replay_timeout_secs: 0,
            receive_backoff_base_ms: 100,
            receive_backoff_max_ms: 5000,
        }
    }
}

impl WorkerConfig {
    pub fn replay_timeout(&self) -> Option<Duration> {
        (self.replay_timeout_secs > 0).then(|| Duration::from_secs(self.replay_timeout_secs))
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Overall ingress request timeout in seconds (0 = none).
    pub request_secs: u64,
}

impl TimeoutConfig {
    pub fn request(&self) -> Option<Duration> {
        (self.request_secs > 0).then(|| Duration::from_secs(self.request_secs))
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
