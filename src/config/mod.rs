//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize, defaults for absent fields)
//!     → environment overrides (REDIS_ADDRESS, REQUEST_SIZE_LIMIT, ...)
//!     → validation.rs (semantic checks)
//!     → RelayConfig (validated, immutable)
//!     → shared via Arc to the dispatcher and workers
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_or_default, ConfigError};
pub use schema::{
    IngressConfig, ListenerConfig, ObservabilityConfig, QueueBackend, QueueConfig, RelayConfig,
    TimeoutConfig, WorkerConfig, WorkerMode,
};
