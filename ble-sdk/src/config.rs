//! Configuration for a `BleContext`

use ble_state::SyncConfig;
use event_bus::BusConfig;

use crate::error::Result;

/// Configuration for the event bus and every synchronizer a context starts
#[derive(Debug, Clone, Default)]
pub struct ContextConfig {
    pub bus: BusConfig,
    pub sync: SyncConfig,
}

impl ContextConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Quick `stop()` and handlers that run one at a time, in publish order
    pub fn deterministic() -> Self {
        Self {
            bus: BusConfig::serial_handlers(),
            sync: SyncConfig::low_latency(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.bus.validate()?;
        self.sync.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_presets_are_valid() {
        assert!(ContextConfig::default().validate().is_ok());
        assert!(ContextConfig::deterministic().validate().is_ok());
    }

    #[test]
    fn test_invalid_part_is_reported() {
        let mut config = ContextConfig::default();
        config.sync.poll_interval = Duration::ZERO;
        assert!(matches!(config.validate(), Err(crate::SdkError::State(_))));
    }
}
