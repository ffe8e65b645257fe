//! Error types for the event bus

use thiserror::Error;

/// Errors that can occur when configuring the event bus
///
/// Publishing and subscribing never return errors: an absent dispatcher
/// silently drops publishes and an empty topic name is a programming error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Result type for event bus operations
pub type Result<T> = std::result::Result<T, BusError>;
