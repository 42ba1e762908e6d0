//! Ingress HTTP server setup.
//!
//! # Responsibilities
//! - Create Axum Router with the dispatch handler on every path
//! - Wire up middleware (request ID, tracing, optional timeout)
//! - Classify each request and hand it to the deferred or sync path
//! - Bind server to listener with graceful shutdown

use axum::{
    body::Body,
    extract::State,
    http::{uri::Authority, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::RelayConfig;
use crate::http::{deferred, forward, request};
use crate::lifecycle::shutdown::ShutdownSignal;
use crate::observability::metrics::{self, Mode};
use crate::queue::{IdGenerator, QueueClient};

/// The shared HTTP client type used for sync forwarding and replay.
pub type HttpClient = Client<HttpConnector, Body>;

pub fn http_client() -> HttpClient {
    Client::builder(TokioExecutor::new()).build(HttpConnector::new())
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<dyn QueueClient>,
    pub ids: Arc<dyn IdGenerator>,
    pub client: HttpClient,
    pub stream: String,
    pub destination: Option<Authority>,
    pub size_limit: u64,
}

impl AppState {
    pub fn new(
        config: &RelayConfig,
        queue: Arc<dyn QueueClient>,
        ids: Arc<dyn IdGenerator>,
    ) -> Result<Self, axum::http::uri::InvalidUri> {
        let destination = config
            .ingress
            .destination
            .as_deref()
            .map(Authority::from_str)
            .transpose()?;

        Ok(Self {
            queue,
            ids,
            client: http_client(),
            stream: config.queue.stream.clone(),
            destination,
            size_limit: config.ingress.size_limit,
        })
    }
}

/// HTTP server for the ingress dispatcher.
pub struct IngressServer {
    router: Router,
}

impl IngressServer {
    pub fn new(config: &RelayConfig, state: AppState) -> Self {
        Self {
            router: build_router(config, state),
        }
    }

    /// The fully layered router, for serving or for driving in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(self, listener: TcpListener, mut shutdown: ShutdownSignal) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Ingress server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.recv().await })
            .await?;

        tracing::info!("Ingress server stopped");
        Ok(())
    }
}

/// Build the Axum router with all middleware layers.
#[allow(deprecated)]
pub fn build_router(config: &RelayConfig, state: AppState) -> Router {
    let router = Router::new()
        .route("/{*path}", any(dispatch))
        .route("/", any(dispatch))
        .with_state(state);

    let router = match config.timeouts.request() {
        Some(timeout) => router.layer(TimeoutLayer::new(timeout)),
        None => router,
    };

    router
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

/// Main dispatch handler.
/// Classifies the request, then captures it or forwards it.
async fn dispatch(State(state): State<AppState>, request: Request<Body>) -> Response {
    let started = Instant::now();
    let request_id = request::request_id(request.headers()).to_string();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    if !request::is_deferred(request.headers()) {
        tracing::debug!(request_id = %request_id, method = %method, path = %path, "Forwarding request");
        let response = forward::forward(&state, request).await;
        metrics::record_ingress(Mode::Sync, response.status().as_u16(), started);
        return response;
    }

    let response = match deferred::enqueue(&state, request).await {
        Ok(envelope_id) => {
            tracing::info!(
                request_id = %request_id,
                envelope_id = %envelope_id,
                method = %method,
                path = %path,
                "Request deferred"
            );
            StatusCode::ACCEPTED.into_response()
        }
        Err(e) => {
            if let deferred::DispatchError::Queue(queue_error) = &e {
                metrics::record_enqueue_failure(queue_error.kind());
                tracing::error!(request_id = %request_id, error = %e, "Failed to enqueue request");
            } else {
                tracing::warn!(
                    request_id = %request_id,
                    method = %method,
                    path = %path,
                    status = e.status().as_u16(),
                    error = %e,
                    "Deferred request refused"
                );
            }
            e.into_response()
        }
    };

    metrics::record_ingress(Mode::Deferred, response.status().as_u16(), started);
    response
}
