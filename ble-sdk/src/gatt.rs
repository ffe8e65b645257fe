//! GATT service, characteristic and descriptor facades
//!
//! Facades are views built from the object cache when a device lists its
//! children. `properties()` is the snapshot taken at that moment;
//! `get_properties()` and the value operations go to the transport.

use std::collections::HashMap;
use std::sync::Arc;

use ble_state::{
    EntityKind, GattCharacteristic1Properties, GattDescriptor1Properties, GattService1Properties,
    InterfaceNames,
};
use ble_transport::{ObjectPath, PropertyBag, Transport, Value};

use crate::error::Result;

/// Path, interface and transport shared by every GATT facade
#[derive(Clone)]
struct RemoteObject {
    path: ObjectPath,
    interface: String,
    transport: Arc<dyn Transport>,
}

impl RemoteObject {
    fn fetch(&self) -> Result<PropertyBag> {
        Ok(self.transport.fetch_properties(&self.path, &self.interface)?)
    }

    fn call(&self, method: &str, args: &[Value]) -> Result<Vec<Value>> {
        tracing::debug!("{} {}.{}", self.path, self.interface, method);
        Ok(self.transport.invoke(&self.path, &self.interface, method, args)?)
    }

    fn read_value(&self, offset: Option<u16>) -> Result<Vec<u8>> {
        let output = self.call("ReadValue", &[options(offset)])?;
        Ok(output.first().and_then(Value::as_bytes).unwrap_or_default())
    }

    fn write_value(&self, value: &[u8], offset: Option<u16>) -> Result<()> {
        self.call("WriteValue", &[Value::Bytes(value.to_vec()), options(offset)])?;
        Ok(())
    }
}

fn options(offset: Option<u16>) -> Value {
    let mut dict = HashMap::new();
    if let Some(offset) = offset {
        dict.insert("offset".to_string(), Value::U16(offset));
    }
    Value::Dict(dict)
}

/// Facades a device can list from the cache
pub(crate) trait GattEntity: Sized {
    const KIND: EntityKind;

    fn interface(names: &InterfaceNames) -> &str;

    fn from_bag(path: ObjectPath, interface: &str, bag: &PropertyBag, transport: Arc<dyn Transport>) -> Self;
}

macro_rules! gatt_facade {
    ($(#[$meta:meta])* $name:ident, $props:ty, $kind:expr, $iface:ident) => {
        $(#[$meta])*
        #[derive(Clone)]
        pub struct $name {
            remote: RemoteObject,
            properties: $props,
        }

        impl $name {
            pub fn path(&self) -> &ObjectPath {
                &self.remote.path
            }

            pub fn uuid(&self) -> &str {
                &self.properties.uuid
            }

            /// Properties as cached when this facade was built
            pub fn properties(&self) -> &$props {
                &self.properties
            }

            /// Current properties from the transport
            pub fn get_properties(&self) -> Result<$props> {
                Ok(<$props>::from_bag(&self.remote.fetch()?))
            }
        }

        impl GattEntity for $name {
            const KIND: EntityKind = $kind;

            fn interface(names: &InterfaceNames) -> &str {
                &names.$iface
            }

            fn from_bag(path: ObjectPath, interface: &str, bag: &PropertyBag, transport: Arc<dyn Transport>) -> Self {
                Self {
                    remote: RemoteObject {
                        path,
                        interface: interface.to_string(),
                        transport,
                    },
                    properties: <$props>::from_bag(bag),
                }
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("path", &self.remote.path)
                    .field("properties", &self.properties)
                    .finish()
            }
        }
    };
}

gatt_facade!(
    /// A GATT service of a device
    GattService,
    GattService1Properties,
    EntityKind::Service,
    service
);

gatt_facade!(
    /// A GATT characteristic of a device
    Characteristic,
    GattCharacteristic1Properties,
    EntityKind::Characteristic,
    characteristic
);

gatt_facade!(
    /// A GATT descriptor of a characteristic
    Descriptor,
    GattDescriptor1Properties,
    EntityKind::Descriptor,
    descriptor
);

impl Characteristic {
    /// Reads the value, starting at `offset` bytes when given
    pub fn read_value(&self, offset: Option<u16>) -> Result<Vec<u8>> {
        self.remote.read_value(offset)
    }

    pub fn write_value(&self, value: &[u8]) -> Result<()> {
        self.remote.write_value(value, None)
    }

    pub fn write_value_at(&self, value: &[u8], offset: u16) -> Result<()> {
        self.remote.write_value(value, Some(offset))
    }

    /// Asks the device to notify value changes
    ///
    /// Notified values arrive as `Value` changes on the characteristic's
    /// `<path>.changed` topic when a synchronizer covers the path.
    pub fn start_notify(&self) -> Result<()> {
        self.remote.call("StartNotify", &[])?;
        Ok(())
    }

    pub fn stop_notify(&self) -> Result<()> {
        self.remote.call("StopNotify", &[])?;
        Ok(())
    }
}

impl Descriptor {
    pub fn read_value(&self, offset: Option<u16>) -> Result<Vec<u8>> {
        self.remote.read_value(offset)
    }

    pub fn write_value(&self, value: &[u8]) -> Result<()> {
        self.remote.write_value(value, None)
    }
}
