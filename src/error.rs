//! Typed errors for fetch orchestration
//!
//! Every failure in the engine is a [`CrawlError`] carrying a closed set of
//! kinds and a retryability flag fixed at construction. The retry coordinator
//! branches only on that flag, so classification happens exactly once, at the
//! point where the failure is first observed.

use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// The closed set of error kinds the engine distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Transport-level or non-success HTTP failure
    Network,
    /// HTTP 429, optionally carrying a retry-after hint
    RateLimit,
    /// Malformed markup; retrying will not fix the input
    Parse,
    /// Caller supplied bad input (invalid URL, bad header name, ...)
    Validation,
    /// A failure that occurred inside pipeline execution
    Pipeline,
    /// Concurrency-gate or queue failure
    Queue,
    /// Fallback for failures that fit no specialized kind
    Generic,
}

impl ErrorKind {
    /// The retryability fixed by this kind.
    ///
    /// Network and RateLimit failures are transient by definition. Parse and
    /// Validation failures are never retryable. Pipeline and Queue default to
    /// retryable but may be overridden; Generic defaults to non-retryable so
    /// unknown failures never loop.
    pub fn default_retryable(self) -> bool {
        match self {
            ErrorKind::Network | ErrorKind::RateLimit => true,
            ErrorKind::Parse | ErrorKind::Validation => false,
            ErrorKind::Pipeline | ErrorKind::Queue => true,
            ErrorKind::Generic => false,
        }
    }

    /// Whether the retryability of this kind may be overridden after
    /// construction
    fn overridable(self) -> bool {
        matches!(
            self,
            ErrorKind::Pipeline | ErrorKind::Queue | ErrorKind::Generic
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Network => "network",
            ErrorKind::RateLimit => "rate-limit",
            ErrorKind::Parse => "parse",
            ErrorKind::Validation => "validation",
            ErrorKind::Pipeline => "pipeline",
            ErrorKind::Queue => "queue",
            ErrorKind::Generic => "generic",
        };
        f.write_str(name)
    }
}

/// A classified failure
///
/// `retryable` is fixed by [`ErrorKind`] at construction; only the kinds that
/// allow it can be overridden via [`CrawlError::with_retryable`].
#[derive(Debug, Error)]
#[error("{kind} error: {message}")]
pub struct CrawlError {
    pub kind: ErrorKind,
    pub message: String,
    pub url: Option<String>,
    pub status_code: Option<u16>,
    /// Server-provided retry hint in seconds (RateLimit only)
    pub retry_after: Option<u64>,
    pub retryable: bool,
    pub metadata: BTreeMap<String, serde_json::Value>,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl CrawlError {
    /// Classifies a failure, fixing retryability from the kind
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            url: None,
            status_code: None,
            retry_after: None,
            retryable: kind.default_retryable(),
            metadata: BTreeMap::new(),
            source: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Overrides the retryability flag, ignored for kinds whose flag is
    /// fixed (Network, RateLimit, Parse, Validation)
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        if self.kind.overridable() {
            self.retryable = retryable;
        }
        self
    }

    pub fn with_source(
        mut self,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Classifies a raw transport failure from the HTTP client.
    ///
    /// Timeouts, refused connections, and mid-body failures are transient
    /// Network errors; anything else (builder misuse, decode failures) falls
    /// back to a non-retryable Generic error with the cause preserved.
    pub fn from_transport(url: &str, err: reqwest::Error) -> Self {
        let transient =
            err.is_timeout() || err.is_connect() || err.is_request() || err.is_body();
        if transient {
            CrawlError::new(ErrorKind::Network, format!("request to {} failed: {}", url, err))
                .with_url(url)
                .with_source(err)
        } else {
            CrawlError::new(ErrorKind::Generic, format!("request to {} failed: {}", url, err))
                .with_url(url)
                .with_source(err)
        }
    }
}

/// Returns the error's own retryability flag.
///
/// Exists so callers holding a `CrawlError` behind a reference can branch
/// without pattern matching; raw transport failures are classified into
/// `CrawlError` before they ever reach a retry decision.
pub fn is_retryable(err: &CrawlError) -> bool {
    err.retryable
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}
