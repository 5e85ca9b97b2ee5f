//! Crate-level error type.

use thiserror::Error;

/// Errors surfaced by the public [`crate::sender::Sender`] and
/// [`crate::receiver::Receiver`] API.
///
/// Protocol-level anomalies (malformed frames, duplicate data, out-of-window
/// data, stale ACKs) are logged and absorbed inside the background tasks and
/// never show up here.
#[derive(Debug, Error)]
pub enum SwpError {
    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The endpoint has been shut down, or its transport is closed.
    #[error("endpoint closed")]
    Closed,

    /// Underlying I/O error from the OS.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SwpError>;
