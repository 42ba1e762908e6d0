//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Response;
use deferred_relay::config::RelayConfig;
use deferred_relay::http::{AppState, IngressServer};
use deferred_relay::queue::{Delivery, Envelope, IdGenerator, QueueClient, QueueError};

/// Sequential ids: `id-1`, `id-2`, ...
#[derive(Default)]
pub struct SequentialIds {
    next: AtomicU32,
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> String {
        format!("id-{}", self.next.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

/// A queue whose append always fails.
pub struct FailingQueue;

#[async_trait]
impl QueueClient for FailingQueue {
    async fn append(&self, _stream: &str, _envelope: &Envelope) -> Result<(), QueueError> {
        Err(QueueError::Unavailable("connection refused".into()))
    }

    async fn receive_next(&self, _stream: &str) -> Result<Delivery, QueueError> {
        Err(QueueError::Unavailable("connection refused".into()))
    }

    async fn ack(&self, _stream: &str, _receipt: &str) -> Result<(), QueueError> {
        Ok(())
    }
}

/// A queue that hands out a fixed script of receive results, then blocks
/// forever. Records every receive attempt and ack.
#[derive(Default)]
pub struct ScriptedQueue {
    script: Mutex<VecDeque<Result<Delivery, QueueError>>>,
    pub receives: AtomicU32,
    pub acks: Mutex<Vec<String>>,
}

impl ScriptedQueue {
    pub fn new(script: Vec<Result<Delivery, QueueError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Default::default()
        }
    }

    pub fn acked(&self) -> Vec<String> {
        self.acks.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueueClient for ScriptedQueue {
    async fn append(&self, _stream: &str, _envelope: &Envelope) -> Result<(), QueueError> {
        Ok(())
    }

    async fn receive_next(&self, _stream: &str) -> Result<Delivery, QueueError> {
        self.receives.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(result) => result,
            None => std::future::pending().await,
        }
    }

    async fn ack(&self, _stream: &str, receipt: &str) -> Result<(), QueueError> {
        self.acks.lock().unwrap().push(receipt.to_string());
        Ok(())
    }
}

/// Config pointed at `destination` with a small size limit.
pub fn test_config(destination: Option<String>) -> RelayConfig {
    let mut config = RelayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.ingress.destination = destination;
    config.ingress.size_limit = 64;
    config.queue.stream = "test-stream".into();
    config.worker.receive_backoff_base_ms = 10;
    config.worker.receive_backoff_max_ms = 50;
    config
}

pub fn ingress(config: &RelayConfig, queue: Arc<dyn QueueClient>) -> IngressServer {
    let state = AppState::new(config, queue, Arc::new(SequentialIds::default())).unwrap();
    IngressServer::new(config, state)
}

pub fn envelope(id: &str, payload: impl Into<String>) -> Envelope {
    Envelope {
        id: id.to_string(),
        payload: payload.into(),
    }
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn eventually<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

/// An address nothing is listening on.
pub async fn closed_port() -> std::net::SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}
