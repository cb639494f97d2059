//! Server error types.

use thiserror::Error;

/// Errors surfaced while starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding the listener failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested bind address.
        addr: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Socket-level I/O failure after binding.
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The metrics recorder could not be installed.
    #[error("failed to install metrics recorder: {0}")]
    Metrics(String),
    /// The hub coordinator has stopped and no longer accepts commands.
    #[error("hub coordinator is not running")]
    HubClosed,
}
