//! # BLE SDK - device facades over a cached object tree
//!
//! Provides sync-first handles for remote BLE devices and their GATT
//! objects, backed by a local cache of the remote object tree:
//!
//! ```rust,ignore
//! use ble_sdk::{BleContext, ContextConfig};
//! use event_bus::Callback;
//!
//! let context = BleContext::new(transport, ContextConfig::default())?;
//! context.start()?;
//!
//! let device = context.device("/org/bluez/hci0/dev_AA_BB_CC_DD_EE_FF")?;
//! device.connect()?;
//!
//! // Three ways to read a device:
//! let cached = device.properties();          // Last known values
//! let fresh = device.get_properties()?;      // Transport call + snapshot update
//! device.on("changed", &Callback::from_fn(|event| {
//!     println!("{:?}", event.payload());     // Pushed changes
//! }))?;
//!
//! if let Some(battery) = device.characteristic_by_uuid("00002a19-0000-1000-8000-00805f9b34fb") {
//!     println!("Battery: {:?}", battery.read_value(None)?);
//! }
//!
//! context.clear_device(&device);
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ble-sdk (BleContext, Device, GATT facades)
//!     ↓
//! ble-state (ObjectCache, ChangeSynchronizer, domain events)
//!     ↓                         ↓
//! ble-transport (Transport)   event-bus (EventBus)
//! ```

mod config;
mod context;
mod device;
mod error;
mod gatt;
mod registry;

pub use config::ContextConfig;
pub use context::BleContext;
pub use device::Device;
pub use error::{Result, SdkError};
pub use gatt::{Characteristic, Descriptor, GattService};

// Re-export the types applications handle alongside the facades
pub use ble_state::logging;
pub use ble_state::{
    bluez, topics, Device1Properties, DomainBus, DomainEvent, EntityKind, EventStatus,
    GattCharacteristic1Properties, GattDescriptor1Properties, GattService1Properties, SyncConfig,
};
pub use ble_transport::{ObjectPath, PropertyBag, Transport, TransportError, Value};
pub use event_bus::{BusConfig, Callback, Event, EventIterator, Subscription};

/// Commonly used types
pub mod prelude {
    pub use crate::{
        BleContext, Callback, Characteristic, ContextConfig, Device, DomainEvent, GattService,
        ObjectPath, SdkError,
    };
}
