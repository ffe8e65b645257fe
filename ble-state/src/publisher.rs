//! Derivation of domain events from object tree changes

use ble_transport::{InterfaceMap, ObjectPath, ObjectTree, PropertyBag, Value};

use crate::config::InterfaceNames;
use crate::events::{
    topics, AdapterEvent, DiscoveredDeviceEvent, DomainBus, DomainEvent, EventStatus,
    GattCharacteristicEvent, GattDescriptorEvent, GattServiceEvent, PropertyChangedEvent,
};
use crate::path::{adapter_name, owning_device, EntityKind};
use crate::property::{
    Device1Properties, FieldUpdate, GattCharacteristic1Properties, GattDescriptor1Properties,
    GattService1Properties,
};

/// Publishes the domain events that follow from one change to the tree
///
/// Events for one object always go out in `EntityKind::ORDER`, and each
/// GATT event is published on its global topic before its device-scoped one.
#[derive(Debug, Clone)]
pub struct DomainPublisher {
    bus: DomainBus,
    interfaces: InterfaceNames,
}

impl DomainPublisher {
    pub fn new(bus: DomainBus, interfaces: InterfaceNames) -> Self {
        Self { bus, interfaces }
    }

    pub fn interfaces(&self) -> &InterfaceNames {
        &self.interfaces
    }

    fn interface(&self, kind: EntityKind) -> &str {
        match kind {
            EntityKind::Device => &self.interfaces.device,
            EntityKind::Adapter => &self.interfaces.adapter,
            EntityKind::Service => &self.interfaces.service,
            EntityKind::Characteristic => &self.interfaces.characteristic,
            EntityKind::Descriptor => &self.interfaces.descriptor,
        }
    }

    /// Events for interfaces that appeared on `path`
    pub fn added(&self, path: &ObjectPath, interfaces: &InterfaceMap) {
        for kind in EntityKind::ORDER {
            if let Some(props) = interfaces.get(self.interface(kind)) {
                self.lifecycle(kind, path, EventStatus::Added, Some(props));
            }
        }
    }

    /// Added events for every object in `tree`, in path order
    pub fn republish(&self, tree: &ObjectTree) {
        tracing::debug!("Republishing {} objects", tree.len());
        for (path, interfaces) in tree.iter() {
            self.added(path, interfaces);
        }
    }

    /// Events for interfaces that disappeared from `path`
    ///
    /// `last_known` holds the cached properties of the removed interfaces,
    /// when the cache had them.
    pub fn removed<S: AsRef<str>>(&self, path: &ObjectPath, interfaces: &[S], last_known: &InterfaceMap) {
        for kind in EntityKind::ORDER {
            let iface = self.interface(kind);
            if interfaces.iter().any(|i| i.as_ref() == iface) {
                self.lifecycle(kind, path, EventStatus::Removed, last_known.get(iface));
            }
        }
    }

    fn lifecycle(&self, kind: EntityKind, path: &ObjectPath, status: EventStatus, props: Option<&PropertyBag>) {
        match kind {
            EntityKind::Device => {
                let device = match status {
                    EventStatus::Added => props.map(Device1Properties::from_bag),
                    EventStatus::Removed => None,
                };
                tracing::debug!("Device {} {:?}", path, status);
                self.bus.publish(
                    topics::DISCOVERY,
                    DomainEvent::Discovery(DiscoveredDeviceEvent {
                        path: path.clone(),
                        status,
                        device,
                    }),
                );
            }
            EntityKind::Adapter => {
                let Some(name) = adapter_name(path) else {
                    tracing::warn!("Adapter at {} has no name segment, skipping", path);
                    return;
                };
                tracing::debug!("Adapter {} {:?}", name, status);
                self.bus.publish(
                    topics::ADAPTER,
                    DomainEvent::Adapter(AdapterEvent {
                        name: name.to_string(),
                        path: path.clone(),
                        status,
                    }),
                );
            }
            EntityKind::Service | EntityKind::Characteristic | EntityKind::Descriptor => {
                let Some(device_path) = owning_device(kind, path) else {
                    tracing::warn!("{:?} at {} is too shallow to have an owning device, skipping", kind, path);
                    return;
                };
                let (topic, event) = match kind {
                    EntityKind::Service => (
                        topics::SERVICE,
                        DomainEvent::Service(GattServiceEvent {
                            path: path.clone(),
                            device_path: device_path.clone(),
                            properties: props.map(GattService1Properties::from_bag),
                            status,
                        }),
                    ),
                    EntityKind::Characteristic => (
                        topics::CHARACTERISTIC,
                        DomainEvent::Characteristic(GattCharacteristicEvent {
                            path: path.clone(),
                            device_path: device_path.clone(),
                            properties: props.map(GattCharacteristic1Properties::from_bag),
                            status,
                        }),
                    ),
                    _ => (
                        topics::DESCRIPTOR,
                        DomainEvent::Descriptor(GattDescriptorEvent {
                            path: path.clone(),
                            device_path: device_path.clone(),
                            properties: props.map(GattDescriptor1Properties::from_bag),
                            status,
                        }),
                    ),
                };
                tracing::debug!("{:?} {} {:?}", kind, path, status);
                self.bus.publish(topic, event.clone());
                self.bus.publish(&topics::scoped(&device_path, topic), event);
            }
        }
    }

    /// One `<path>.changed` event per changed field, in field name order
    ///
    /// Device events carry the device properties after each field is
    /// applied, starting from `base` (defaults when `None`). `base` is
    /// ignored for other interfaces.
    pub fn changed(
        &self,
        path: &ObjectPath,
        interface: &str,
        changed: &PropertyBag,
        base: Option<Device1Properties>,
    ) {
        let is_device = interface == self.interfaces.device;
        let mut device = is_device.then(|| base.unwrap_or_default());

        let mut fields: Vec<(&String, &Value)> = changed.iter().collect();
        fields.sort_by(|a, b| a.0.cmp(b.0));

        let topic = topics::scoped(path, topics::CHANGED);
        for (field, value) in fields {
            if let Some(props) = device.as_mut() {
                match props.apply(field, value) {
                    FieldUpdate::Applied => {}
                    outcome => tracing::debug!(
                        "{}: {} not applied to device properties ({:?})",
                        path,
                        field,
                        outcome
                    ),
                }
            }
            tracing::debug!("{} {}.{} changed", path, interface, field);
            self.bus.publish(
                &topic,
                DomainEvent::PropertyChanged(PropertyChangedEvent {
                    path: path.clone(),
                    interface: interface.to_string(),
                    field: field.clone(),
                    value: value.clone(),
                    properties: device.clone(),
                }),
            );
        }
    }
}
