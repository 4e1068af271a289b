//! Logging bootstrap
//!
//! Installs a tracing subscriber according to the `[logging]` config
//! section. Silent mode installs nothing, which suppresses all output
//! since events without a subscriber go nowhere.

use crate::config::{LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

/// Initializes the global tracing subscriber.
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init(config: &LoggingConfig) {
    if config.silent {
        return;
    }

    let filter = EnvFilter::new(&config.level);

    match config.format {
        LogFormat::Json => {
            let _ = tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .try_init();
        }
        LogFormat::Text => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_file(false)
                .try_init();
        }
    }
}
