//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses (bind addresses, Redis address)
//! - Validate value ranges (size limit > 0, concurrency >= 1, backoff bounds)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RelayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{QueueBackend, RelayConfig};
use crate::queue::redis::RedisEndpoint;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Check every rule and collect all failures.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_socket_addr(&mut errors, "listener.bind_address", &config.listener.bind_address);
    check_socket_addr(&mut errors, "worker.push_bind_address", &config.worker.push_bind_address);
    if config.observability.metrics_enabled {
        check_socket_addr(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if config.ingress.size_limit == 0 {
        errors.push(ValidationError::new("ingress.size_limit", "must be greater than 0"));
    }
    if let Some(destination) = &config.ingress.destination {
        if destination.parse::<axum::http::uri::Authority>().is_err() {
            errors.push(ValidationError::new(
                "ingress.destination",
                format!("{destination:?} is not a valid host[:port]"),
            ));
        }
    }

    let queue = &config.queue;
    for (field, value) in [
        ("queue.stream", &queue.stream),
        ("queue.consumer_group", &queue.consumer_group),
        ("queue.consumer_name", &queue.consumer_name),
    ] {
        if value.trim().is_empty() {
            errors.push(ValidationError::new(field, "must not be empty"));
        }
    }
    if queue.backend == QueueBackend::Redis {
        if let Err(e) = RedisEndpoint::parse(&queue.address) {
            errors.push(ValidationError::new("queue.address", e.to_string()));
        }
    }

    let worker = &config.worker;
    if worker.concurrency == 0 {
        errors.push(ValidationError::new("worker.concurrency", "must be at least 1"));
    }
    if worker.receive_backoff_base_ms > worker.receive_backoff_max_ms {
        errors.push(ValidationError::new(
            "worker.receive_backoff_base_ms",
            "must not exceed worker.receive_backoff_max_ms",
        ));
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level {:?}", config.observability.log_level),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_socket_addr(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(field, format!("{value:?} is not a socket address")));
    }
}
