//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_ingress_requests_total` (counter): requests by mode, status
//! - `relay_ingress_request_duration_seconds` (histogram): by mode
//! - `relay_enqueue_failures_total` (counter): by reason
//! - `relay_replays_total` (counter): by outcome
//! - `relay_replay_duration_seconds` (histogram)

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// How the dispatcher handled a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Sync,
    Deferred,
}

impl Mode {
    fn as_str(self) -> &'static str {
        match self {
            Mode::Sync => "sync",
            Mode::Deferred => "deferred",
        }
    }
}

/// Install the Prometheus recorder and its HTTP scrape listener.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_ingress(mode: Mode, status: u16, started: Instant) {
    metrics::counter!(
        "relay_ingress_requests_total",
        "mode" => mode.as_str(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("relay_ingress_request_duration_seconds", "mode" => mode.as_str())
        .record(started.elapsed().as_secs_f64());
}

pub fn record_enqueue_failure(reason: &'static str) {
    metrics::counter!("relay_enqueue_failures_total", "reason" => reason).increment(1);
}

pub fn record_replay(outcome: &'static str, started: Instant) {
    metrics::counter!("relay_replays_total", "outcome" => outcome).increment(1);
    metrics::histogram!("relay_replay_duration_seconds").record(started.elapsed().as_secs_f64());
}
