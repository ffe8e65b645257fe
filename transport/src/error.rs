//! Error types for transport adapters

use thiserror::Error;

/// Errors a transport adapter can report
///
/// The core never retries these; they are handed back to the caller
/// unchanged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// A remote call failed
    #[error("Call {method} on {path} failed: {message}")]
    Call {
        path: String,
        method: String,
        message: String,
    },

    /// The connection to the remote service is gone
    #[error("Transport disconnected: {0}")]
    Disconnected(String),

    /// The adapter does not support the requested operation or scope
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// The remote service did not answer in time
    #[error("Timed out after {0}ms")]
    Timeout(u64),
}

impl TransportError {
    /// Shorthand for a failed remote call
    pub fn call(path: impl Into<String>, method: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Call {
            path: path.into(),
            method: method.into(),
            message: message.into(),
        }
    }
}

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;
