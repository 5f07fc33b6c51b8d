//! Error types for the focusdns engine.

use std::io;

use thiserror::Error;

/// Main error type for focusdns operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("metrics error: {0}")]
    Metrics(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadFile(#[source] io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),

    #[error("validation failed: {0}")]
    Validation(String),
}

/// Network-related errors.
///
/// Establishment failures are fatal to a session; everything else is
/// absorbed per-packet by the interception loop.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("failed to establish virtual interface: {0}")]
    Establish(String),

    #[error("failed to write packet to interface: {0}")]
    SendFailed(String),

    #[error("upstream resolver did not answer in time")]
    UpstreamTimeout,
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;
