//! Domain events published on the event bus
//!
//! Global topics carry every event of a kind; device-scoped topics
//! (`<device path>.<kind>`) carry the events of one device's subtree.

use ble_transport::{ObjectPath, Value};
use event_bus::EventBus;
use serde::{Deserialize, Serialize};

use crate::property::{
    Device1Properties, GattCharacteristic1Properties, GattDescriptor1Properties,
    GattService1Properties,
};

/// Bus carrying domain events
pub type DomainBus = EventBus<DomainEvent>;

/// Topic names
pub mod topics {
    use ble_transport::ObjectPath;

    pub const DISCOVERY: &str = "discovery";
    pub const ADAPTER: &str = "adapter";
    pub const SERVICE: &str = "service";
    pub const CHARACTERISTIC: &str = "char";
    pub const DESCRIPTOR: &str = "desc";
    pub const CHANGED: &str = "changed";

    /// `<path>.<kind>`
    pub fn scoped(path: &ObjectPath, kind: &str) -> String {
        format!("{}.{}", path, kind)
    }

    /// `<path>.*`, matching every scoped topic of `path`
    pub fn all_scoped(path: &ObjectPath) -> String {
        scoped(path, "*")
    }
}

/// Whether an object appeared or disappeared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventStatus {
    Added,
    Removed,
}

/// A device appeared in or left the tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredDeviceEvent {
    pub path: ObjectPath,
    pub status: EventStatus,
    /// Device properties when added, `None` when removed
    pub device: Option<Device1Properties>,
}

/// An adapter appeared or disappeared
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterEvent {
    /// Adapter name, e.g. `hci0`
    pub name: String,
    pub path: ObjectPath,
    pub status: EventStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GattServiceEvent {
    pub path: ObjectPath,
    pub device_path: ObjectPath,
    pub properties: Option<GattService1Properties>,
    pub status: EventStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GattCharacteristicEvent {
    pub path: ObjectPath,
    pub device_path: ObjectPath,
    pub properties: Option<GattCharacteristic1Properties>,
    pub status: EventStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GattDescriptorEvent {
    pub path: ObjectPath,
    pub device_path: ObjectPath,
    pub properties: Option<GattDescriptor1Properties>,
    pub status: EventStatus,
}

/// One field of one object changed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyChangedEvent {
    pub path: ObjectPath,
    pub interface: String,
    pub field: String,
    pub value: Value,
    /// Device properties after the change, when the object is a device
    pub properties: Option<Device1Properties>,
}

/// Payload of every event on the domain bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DomainEvent {
    Discovery(DiscoveredDeviceEvent),
    Adapter(AdapterEvent),
    Service(GattServiceEvent),
    Characteristic(GattCharacteristicEvent),
    Descriptor(GattDescriptorEvent),
    PropertyChanged(PropertyChangedEvent),
    /// Application-defined payload sent with `Device::emit`
    Custom(Value),
}

impl DomainEvent {
    /// Path of the object the event is about, if it has one
    pub fn path(&self) -> Option<&ObjectPath> {
        match self {
            DomainEvent::Discovery(e) => Some(&e.path),
            DomainEvent::Adapter(e) => Some(&e.path),
            DomainEvent::Service(e) => Some(&e.path),
            DomainEvent::Characteristic(e) => Some(&e.path),
            DomainEvent::Descriptor(e) => Some(&e.path),
            DomainEvent::PropertyChanged(e) => Some(&e.path),
            DomainEvent::Custom(_) => None,
        }
    }

    /// Added/removed status for lifecycle events
    pub fn status(&self) -> Option<EventStatus> {
        match self {
            DomainEvent::Discovery(e) => Some(e.status),
            DomainEvent::Adapter(e) => Some(e.status),
            DomainEvent::Service(e) => Some(e.status),
            DomainEvent::Characteristic(e) => Some(e.status),
            DomainEvent::Descriptor(e) => Some(e.status),
            DomainEvent::PropertyChanged(_) | DomainEvent::Custom(_) => None,
        }
    }
}
