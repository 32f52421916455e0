/// Error handling module for Bridge Runner.
///
/// This module defines the error types used throughout the crate.
/// Errors fall into a small taxonomy: configuration problems are fatal at
/// startup, process errors are recovered by the restart loop, and upstream
/// errors are surfaced to HTTP callers as a bad-gateway response.
///
/// # Example
///
/// ```
/// use bridge_runner::error::{Error, Result};
///
/// fn handle_error(result: Result<()>) {
///     match result {
///         Ok(_) => println!("Operation succeeded"),
///         Err(Error::ConfigInvalid(msg)) => println!("Fix your configuration: {}", msg),
///         Err(Error::Upstream(msg)) => println!("Backing process unreachable: {}", msg),
///         Err(e) => println!("Other error: {}", e),
///     }
/// }
/// ```
use thiserror::Error;

/// Errors that can occur in the bridge-runner crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to read or parse configuration from a file or the environment.
    ///
    /// This error occurs when:
    /// - The configuration file cannot be read
    /// - The JSON/YAML is malformed
    /// - An environment variable holds a value of the wrong type
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Configuration parsed but contains values that fail validation checks.
    ///
    /// This error occurs when:
    /// - No backing command is configured
    /// - Ports collide or are zero
    /// - Probe timing or thresholds are out of range
    /// - Public paths are malformed or overlap
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Error when starting, signalling, or waiting on the backing process.
    #[error("Backing process error: {0}")]
    Process(String),

    /// The loopback connection to the backing process failed.
    ///
    /// This error occurs when:
    /// - The backing process is not listening yet (connection refused)
    /// - The connection is reset before a response head arrives
    /// - A protocol upgrade is refused
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Operation timed out.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Any other error not covered by the above categories.
    #[error("Other error: {0}")]
    Other(String),
}

impl Error {
    /// Classify a `reqwest` failure talking to the loopback target.
    pub(crate) fn upstream(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout(err.to_string())
        } else {
            Error::Upstream(err.to_string())
        }
    }
}

/// Result type for bridge-runner operations.
pub type Result<T> = std::result::Result<T, Error>;
