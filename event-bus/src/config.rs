//! Configuration for the event bus

use std::time::Duration;

use crate::error::BusError;

/// Configuration for an `EventBus`
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Capacity of the queue between `publish` and the dispatch loop.
    /// `publish` blocks while the queue is full.
    /// Default: 256
    pub queue_capacity: usize,

    /// Maximum number of handlers running at the same time
    /// Default: 4
    pub handler_threads: usize,

    /// How long a stopping dispatch loop waits for running handlers
    /// Default: 1 second
    pub shutdown_grace: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            handler_threads: 4,
            shutdown_grace: Duration::from_secs(1),
        }
    }
}

impl BusConfig {
    /// Create a new BusConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration with one handler thread, useful when handlers share
    /// state that is not thread-safe enough to run concurrently
    pub fn serial_handlers() -> Self {
        Self {
            handler_threads: 1,
            ..Default::default()
        }
    }

    /// Configuration for busy buses with many publishers
    pub fn high_throughput() -> Self {
        Self {
            queue_capacity: 4096,
            handler_threads: 16,
            ..Default::default()
        }
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<(), BusError> {
        if self.queue_capacity == 0 {
            return Err(BusError::Configuration(
                "Queue capacity must be greater than 0".to_string(),
            ));
        }

        if self.handler_threads == 0 {
            return Err(BusError::Configuration(
                "Handler threads must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(BusConfig::default().validate().is_ok());
        assert!(BusConfig::serial_handlers().validate().is_ok());
        assert!(BusConfig::high_throughput().validate().is_ok());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = BusConfig {
            queue_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(BusError::Configuration(_))));
    }

    #[test]
    fn test_zero_handler_threads_rejected() {
        let config = BusConfig {
            handler_threads: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
