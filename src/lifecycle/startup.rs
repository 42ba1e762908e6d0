//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the queue clients the selected role needs
//! - Bind listeners and spawn the ingress server, pull loops or push receiver
//! - Wait for every task, propagating the first fatal error
//!
//! # Design Decisions
//! - Fail fast on bind errors; an unreachable queue is only a warning, since
//!   both the dispatcher and the workers survive queue outages
//! - Each pull loop owns its Redis connections and consumer name
//! - The memory backend is shared by ingress and workers, so it is only
//!   valid when both run in this process

use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinSet;

use crate::config::{QueueBackend, QueueConfig, RelayConfig, WorkerMode};
use crate::http::{http_client, AppState, IngressServer};
use crate::lifecycle::Shutdown;
use crate::queue::redis::{RedisEndpoint, RedisOptions};
use crate::queue::{MemoryQueue, QueueClient, QueueError, RedisStreamQueue, TimeOrderedIds};
use crate::replay::{push, ReplayWorker, Replayer};

/// Which components this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Ingress,
    Worker,
    AllInOne,
}

impl Role {
    fn runs_ingress(self) -> bool {
        matches!(self, Role::Ingress | Role::AllInOne)
    }

    fn runs_worker(self) -> bool {
        matches!(self, Role::Worker | Role::AllInOne)
    }
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("the memory queue backend requires the all-in-one command")]
    MemoryBackendUnsupported,

    #[error("invalid destination: {0}")]
    Destination(#[from] axum::http::uri::InvalidUri),

    #[error("queue setup failed: {0}")]
    Queue(#[from] QueueError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),

    #[error("task failed: {0}")]
    Task(String),
}

/// Start the components for `role` and run until shutdown.
pub async fn run(role: Role, config: RelayConfig, shutdown: Arc<Shutdown>) -> Result<(), StartupError> {
    let memory = match config.queue.backend {
        QueueBackend::Memory if role != Role::AllInOne => {
            return Err(StartupError::MemoryBackendUnsupported)
        }
        QueueBackend::Memory => Some(Arc::new(MemoryQueue::new())),
        QueueBackend::Redis => None,
    };
    let queue_for = |consumer: String| -> Result<Arc<dyn QueueClient>, StartupError> {
        match &memory {
            Some(memory) => Ok(memory.clone()),
            None => Ok(Arc::new(redis_queue(&config.queue, consumer)?)),
        }
    };

    let mut tasks: JoinSet<Result<(), StartupError>> = JoinSet::new();

    if role.runs_ingress() {
        let queue: Arc<dyn QueueClient> = match &memory {
            Some(memory) => memory.clone(),
            None => {
                let redis = redis_queue(&config.queue, config.queue.consumer_name.clone())?;
                probe(&redis, &config.queue).await;
                Arc::new(redis)
            }
        };

        let state = AppState::new(&config, queue, Arc::new(TimeOrderedIds::new()))?;
        let listener = bind(&config.listener.bind_address).await?;
        let server = IngressServer::new(&config, state);
        let signal = shutdown.subscribe();
        tasks.spawn(async move { server.run(listener, signal).await.map_err(StartupError::from) });
    }

    if role.runs_worker() {
        let replayer = Replayer::new(http_client(), config.worker.replay_timeout());

        match config.worker.mode {
            WorkerMode::Pull => {
                for n in 0..config.worker.concurrency {
                    let name = format!("{}-{n}", config.queue.consumer_name);
                    let queue = queue_for(name.clone())?;
                    let worker = ReplayWorker::new(
                        name,
                        queue,
                        config.queue.stream.clone(),
                        replayer.clone(),
                        &config.worker,
                    );
                    let signal = shutdown.subscribe();
                    tasks.spawn(async move {
                        worker.run(signal).await;
                        Ok(())
                    });
                }
            }
            WorkerMode::Push => {
                let listener = bind(&config.worker.push_bind_address).await?;
                let signal = shutdown.subscribe();
                let replayer = Arc::new(replayer);
                tasks.spawn(async move {
                    push::serve(listener, replayer, signal)
                        .await
                        .map_err(StartupError::from)
                });
            }
        }
    }

    let mut result = Ok(());
    while let Some(joined) = tasks.join_next().await {
        let outcome = joined.unwrap_or_else(|e| Err(StartupError::Task(e.to_string())));
        if let Err(e) = outcome {
            tracing::error!(error = %e, "Component failed, shutting down");
            shutdown.trigger();
            if result.is_ok() {
                result = Err(e);
            }
        }
    }
    result
}

fn redis_queue(config: &QueueConfig, consumer: String) -> Result<RedisStreamQueue, QueueError> {
    Ok(RedisStreamQueue::new(RedisOptions {
        endpoint: RedisEndpoint::parse(&config.address)?,
        group: config.consumer_group.clone(),
        consumer,
        block: config.block(),
        connect_timeout: config.connect_timeout(),
    }))
}

/// Establish the command connection early so a misconfigured address shows
/// up in the startup logs rather than on the first deferred request.
async fn probe(queue: &RedisStreamQueue, config: &QueueConfig) {
    match queue.ping().await {
        Ok(()) => tracing::info!(address = %config.address, stream = %config.stream, "Queue reachable"),
        Err(e) => tracing::warn!(address = %config.address, error = %e, "Queue not reachable yet"),
    }
}

async fn bind(address: &str) -> Result<TcpListener, StartupError> {
    TcpListener::bind(address)
        .await
        .map_err(|source| StartupError::Bind {
            address: address.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backend_requires_all_in_one() {
        let mut config = RelayConfig::default();
        config.queue.backend = QueueBackend::Memory;

        for role in [Role::Ingress, Role::Worker] {
            let result = run(role, config.clone(), Arc::new(Shutdown::new())).await;
            assert!(matches!(result, Err(StartupError::MemoryBackendUnsupported)));
        }
    }

    #[tokio::test]
    async fn test_all_in_one_stops_on_shutdown() {
        let mut config = RelayConfig::default();
        config.queue.backend = QueueBackend::Memory;
        config.listener.bind_address = "127.0.0.1:0".into();
        config.worker.concurrency = 2;

        let shutdown = Arc::new(Shutdown::new());
        shutdown.trigger();
        let result = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            run(Role::AllInOne, config, shutdown),
        )
        .await
        .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = RelayConfig::default();
        config.queue.backend = QueueBackend::Memory;
        config.listener.bind_address = taken.local_addr().unwrap().to_string();

        let result = run(Role::AllInOne, config, Arc::new(Shutdown::new())).await;
        assert!(matches!(result, Err(StartupError::Bind { .. })));
    }
}
