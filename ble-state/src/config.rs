//! Configuration for the change synchronizer

use std::time::Duration;

use crate::error::StateError;

/// Interface names used by BlueZ
pub mod bluez {
    pub const DEVICE1: &str = "org.bluez.Device1";
    pub const ADAPTER1: &str = "org.bluez.Adapter1";
    pub const GATT_SERVICE1: &str = "org.bluez.GattService1";
    pub const GATT_CHARACTERISTIC1: &str = "org.bluez.GattCharacteristic1";
    pub const GATT_DESCRIPTOR1: &str = "org.bluez.GattDescriptor1";
}

/// Interface names that identify each kind of entity in the object tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceNames {
    pub device: String,
    pub adapter: String,
    pub service: String,
    pub characteristic: String,
    pub descriptor: String,
}

impl Default for InterfaceNames {
    fn default() -> Self {
        Self {
            device: bluez::DEVICE1.to_string(),
            adapter: bluez::ADAPTER1.to_string(),
            service: bluez::GATT_SERVICE1.to_string(),
            characteristic: bluez::GATT_CHARACTERISTIC1.to_string(),
            descriptor: bluez::GATT_DESCRIPTOR1.to_string(),
        }
    }
}

impl InterfaceNames {
    fn all(&self) -> [&str; 5] {
        [
            &self.device,
            &self.adapter,
            &self.service,
            &self.characteristic,
            &self.descriptor,
        ]
    }
}

/// Configuration for a `ChangeSynchronizer`
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// How long the signal loop blocks before checking for cancellation.
    /// Bounds how long `stop()` waits for the loop to exit.
    /// Default: 50ms
    pub poll_interval: Duration,

    /// Interface names mapped to entity kinds
    pub interfaces: InterfaceNames,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
            interfaces: InterfaceNames::default(),
        }
    }
}

impl SyncConfig {
    /// Create a new SyncConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration that reacts to `stop()` as quickly as possible
    pub fn low_latency() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            ..Default::default()
        }
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<(), StateError> {
        if self.poll_interval.is_zero() {
            return Err(StateError::Configuration(
                "Poll interval must be greater than 0".to_string(),
            ));
        }

        let names = self.interfaces.all();
        if names.iter().any(|n| n.is_empty()) {
            return Err(StateError::Configuration(
                "Interface names must not be empty".to_string(),
            ));
        }
        for (i, name) in names.iter().enumerate() {
            if names[i + 1..].contains(name) {
                return Err(StateError::Configuration(format!(
                    "Interface name {} is mapped to more than one entity kind",
                    name
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(SyncConfig::default().validate().is_ok());
        assert!(SyncConfig::low_latency().validate().is_ok());
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let config = SyncConfig {
            poll_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_interface_rejected() {
        let mut config = SyncConfig::default();
        config.interfaces.adapter = config.interfaces.device.clone();
        assert!(matches!(config.validate(), Err(StateError::Configuration(_))));
    }
}
