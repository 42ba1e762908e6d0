//! Re-issuing a captured request.

use std::time::{Duration, Instant};

use axum::{
    body::Body,
    http::{uri::Scheme, StatusCode},
};
use futures_util::StreamExt;
use thiserror::Error;

use crate::codec::{self, CodecError};
use crate::http::{HttpClient, PREFER};
use crate::observability::metrics;
use crate::queue::Envelope;

/// Why an envelope was dropped instead of replayed.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error(transparent)]
    MalformedPayload(#[from] CodecError),

    #[error("destination unreachable: {0}")]
    DestinationUnreachable(String),
}

impl ReplayError {
    fn outcome(&self) -> &'static str {
        match self {
            ReplayError::MalformedPayload(_) => "malformed",
            ReplayError::DestinationUnreachable(_) => "unreachable",
        }
    }
}

/// Read `body` to the end, dropping each frame as it arrives. Returns the
/// number of bytes seen; a body that fails midway just stops counting.
async fn drain(body: Body) -> u64 {
    let mut stream = body.into_data_stream();
    let mut seen = 0u64;
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(chunk) => seen += chunk.len() as u64,
            Err(e) => {
                tracing::debug!(error = %e, "Response body ended early");
                break;
            }
        }
    }
    seen
}

/// Decodes envelopes and sends them to their destination.
#[derive(Clone)]
pub struct Replayer {
    client: HttpClient,
    timeout: Option<Duration>,
}

impl Replayer {
    pub fn new(client: HttpClient, timeout: Option<Duration>) -> Self {
        Self { client, timeout }
    }

    /// Replay one envelope and report the destination's status code.
    ///
    /// The response body is read to completion and discarded.
    pub async fn replay(&self, envelope: &Envelope) -> Result<StatusCode, ReplayError> {
        let mut decoded = codec::decode(envelope.payload_bytes())?;
        decoded.headers_mut().remove(PREFER);
        let request = decoded.into_addressed(Scheme::HTTP)?.map(Body::from);

        let send = self.client.request(request);
        let response = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, send)
                .await
                .map_err(|_| ReplayError::DestinationUnreachable(format!("timed out after {limit:?}")))?,
            None => send.await,
        }
        .map_err(|e| ReplayError::DestinationUnreachable(e.to_string()))?;

        let status = response.status();
        let drained = drain(Body::new(response.into_body())).await;
        tracing::debug!(envelope_id = %envelope.id, bytes = drained, "Response discarded");
        Ok(status)
    }

    /// Replay, then log and count the outcome. Never fails: drops are final.
    pub async fn handle(&self, envelope: &Envelope) {
        let started = Instant::now();
        match self.replay(envelope).await {
            Ok(status) => {
                tracing::info!(envelope_id = %envelope.id, status = status.as_u16(), "Request replayed");
                metrics::record_replay(if status.is_success() { "success" } else { "error_status" }, started);
            }
            Err(e) => {
                tracing::warn!(envelope_id = %envelope.id, error = %e, "Dropping envelope");
                metrics::record_replay(e.outcome(), started);
            }
        }
    }
}
