//! Error types for ble-state

use ble_transport::TransportError;
use thiserror::Error;

/// Result type for ble-state operations
pub type Result<T> = std::result::Result<T, StateError>;

/// Errors that can occur while caching and synchronizing the object tree
#[derive(Debug, Error)]
pub enum StateError {
    /// A transport call failed; passed through unchanged
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// A signal did not have the shape its name promises
    #[error("Malformed {name} signal: {reason}")]
    MalformedSignal { name: String, reason: String },

    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A background thread could not be started
    #[error("Failed to spawn {0} thread")]
    Spawn(String),
}

impl StateError {
    pub(crate) fn malformed(name: &str, reason: impl Into<String>) -> Self {
        StateError::MalformedSignal {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}
