//! Fetchloom: a concurrent fetch-orchestration engine
//!
//! This crate implements the coordination core of a crawler: a global
//! concurrency gate and rate pacer, per-domain header state, backoff-based
//! retries serialized per key, and a pipeline/middleware executor, all
//! composed behind a single [`Crawler`] instance exposing `fetch`, `parse`,
//! `extract`, and `execute_pipeline`.
//!
//! Site-specific selectors, storage, and output formatting are collaborators
//! layered on top; the engine has no opinion on them.

pub mod config;
pub mod crawler;
pub mod error;
pub mod limits;
pub mod logging;
pub mod pipeline;
pub mod retry;
pub mod state;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, error::CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, error::ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Crawler, Document, FetchOptions, FetchResponse, SelectorSpec};
pub use error::{ConfigError, CrawlError, ErrorKind};
pub use limits::{Gate, Pacer, Slot};
pub use pipeline::{PipelineContext, PipelineRegistry};
pub use retry::{RetryCoordinator, RetryPolicy, RetryRecord};
pub use state::HeaderStore;
