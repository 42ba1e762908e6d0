//! Deferred request relay.
//!
//! Lets a synchronous HTTP endpoint be called fire-and-forget: requests
//! carrying `Prefer: respond-async` are captured, queued and answered with
//! `202 Accepted`, then replayed later by a worker. All other requests are
//! proxied through synchronously.

pub mod codec;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod queue;
pub mod replay;
pub mod resilience;

pub use config::schema::RelayConfig;
pub use http::IngressServer;
pub use lifecycle::Shutdown;
