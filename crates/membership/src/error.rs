//! Error types for membership configuration.
//!
//! Connectivity failures are not errors here: retrying is the steady state.

use std::path::PathBuf;

/// Errors raised while loading or validating membership configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid backoff policy: {0}")]
    InvalidBackoff(String),
}
