//! Configuration loading and validation
//!
//! Configuration is TOML with kebab-case keys. Every section is optional;
//! defaults produce a working engine (3 retries, 2 req/s, 5 concurrent
//! fetches, 30s request timeout).

mod parser;
mod types;
mod validation;

pub use parser::load_config;
pub use types::{
    Config, HeadersConfig, HttpConfig, LogFormat, LoggingConfig, RateLimitConfig, RetryConfig,
};
pub use validation::validate;
