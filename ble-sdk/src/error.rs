use ble_state::StateError;
use ble_transport::{ObjectPath, TransportError};
use event_bus::BusError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SdkError {
    #[error("State management error: {0}")]
    State(#[from] StateError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Event bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Device {0} has been destroyed")]
    DeviceDestroyed(ObjectPath),
}

pub type Result<T> = std::result::Result<T, SdkError>;
