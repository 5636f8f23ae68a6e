use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

use crate::error::{DropfsError, Result};

pub const LOG_ENV: &str = "DROPFS_LOG";

/// Filter directive: `DROPFS_LOG` wins over the configured filter.
pub fn resolve_filter(configured: &str) -> String {
    std::env::var(LOG_ENV).unwrap_or_else(|_| configured.to_string())
}

/// Install the global subscriber, writing to stderr or appending to
/// `log_file`. Calling it twice is harmless; the first subscriber stays.
pub fn init_logging(log_file: Option<&Path>, configured_filter: &str) -> Result<()> {
    let filter = EnvFilter::try_new(resolve_filter(configured_filter))
        .map_err(|e| DropfsError::Config(format!("Invalid log filter: {}", e)))?;

    let installed = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| {
                    DropfsError::Config(format!(
                        "Failed to open log file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init(),
    };

    if installed.is_err() {
        tracing::debug!("Logging already initialized");
    }
    Ok(())
}
