//! HTTP ingress subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing)
//!     → request.rs (classify: Prefer: respond-async?)
//!     ├─ sync     → forward.rs (rewrite URI, strip hop-by-hop) → destination
//!     │             → response relayed verbatim
//!     └─ deferred → deferred.rs (length checks, capture, append) → 202
//! ```

pub mod deferred;
pub mod forward;
pub mod request;
pub mod response;
pub mod server;

pub use deferred::DispatchError;
pub use request::{is_deferred, PREFER, RESPOND_ASYNC, X_REQUEST_ID};
pub use server::{http_client, AppState, HttpClient, IngressServer};
