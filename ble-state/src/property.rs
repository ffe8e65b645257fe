//! Typed property tables
//!
//! Each table is a plain struct with one field per known property of an
//! interface plus a generated name → setter mapping. Field names that are
//! not in the table are ignored, as are values of the wrong type; `apply`
//! reports which of the two happened so callers can log it.

use ble_transport::{ObjectPath, PropertyBag, Value};
use serde::{Deserialize, Serialize};

/// Conversion from a dynamically-typed property value
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Option<Self>;
}

macro_rules! impl_from_value {
    ($($ty:ty => $accessor:ident),* $(,)?) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: &Value) -> Option<Self> {
                    value.$accessor()
                }
            }
        )*
    };
}

impl_from_value! {
    bool => as_bool,
    u8 => as_u8,
    i16 => as_i16,
    u16 => as_u16,
    i32 => as_i32,
    u32 => as_u32,
    i64 => as_i64,
    u64 => as_u64,
    f64 => as_f64,
    ObjectPath => as_path,
    Vec<u8> => as_bytes,
    Vec<String> => as_string_list,
}

impl FromValue for String {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl FromValue for Vec<ObjectPath> {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_list()?.iter().map(Value::as_path).collect()
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Option<Self> {
        T::from_value(value).map(Some)
    }
}

/// Outcome of applying one named field to a table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldUpdate {
    Applied,
    /// The table has no field with this name
    Unknown,
    /// The field exists but the value has a different type
    TypeMismatch,
}

macro_rules! property_table {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $wire:literal => $field:ident : $ty:ty ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        pub struct $name {
            $( pub $field: $ty, )*
        }

        impl $name {
            /// Property names as they appear on the wire
            pub const FIELDS: &'static [&'static str] = &[$($wire),*];

            /// Build from a property bag, ignoring unknown and mistyped entries
            pub fn from_bag(bag: &PropertyBag) -> Self {
                let mut props = Self::default();
                for (field, value) in bag {
                    let outcome = props.apply(field, value);
                    if outcome != FieldUpdate::Applied {
                        tracing::trace!(
                            "{}: ignoring {} ({:?}, {})",
                            stringify!($name),
                            field,
                            outcome,
                            value.type_name()
                        );
                    }
                }
                props
            }

            /// Set one field by its wire name
            pub fn apply(&mut self, field: &str, value: &Value) -> FieldUpdate {
                match field {
                    $(
                        $wire => match <$ty as FromValue>::from_value(value) {
                            Some(v) => {
                                self.$field = v;
                                FieldUpdate::Applied
                            }
                            None => FieldUpdate::TypeMismatch,
                        },
                    )*
                    _ => FieldUpdate::Unknown,
                }
            }
        }
    };
}

property_table! {
    /// Properties of a remote device
    Device1Properties {
        "Address" => address: String,
        "AddressType" => address_type: String,
        "Name" => name: String,
        "Alias" => alias: String,
        "Icon" => icon: String,
        "Class" => class: u32,
        "Appearance" => appearance: u16,
        "UUIDs" => uuids: Vec<String>,
        "Paired" => paired: bool,
        "Connected" => connected: bool,
        "Trusted" => trusted: bool,
        "Blocked" => blocked: bool,
        "LegacyPairing" => legacy_pairing: bool,
        "RSSI" => rssi: Option<i16>,
        "TxPower" => tx_power: Option<i16>,
        "Modalias" => modalias: String,
        "Adapter" => adapter: Option<ObjectPath>,
        "ManufacturerData" => manufacturer_data: Option<Value>,
        "ServiceData" => service_data: Option<Value>,
        "ServicesResolved" => services_resolved: bool,
    }
}

property_table! {
    /// Properties of a GATT service
    GattService1Properties {
        "UUID" => uuid: String,
        "Device" => device: Option<ObjectPath>,
        "Primary" => primary: bool,
        "Characteristics" => characteristics: Vec<ObjectPath>,
        "Includes" => includes: Vec<ObjectPath>,
    }
}

property_table! {
    /// Properties of a GATT characteristic
    GattCharacteristic1Properties {
        "UUID" => uuid: String,
        "Service" => service: Option<ObjectPath>,
        "Value" => value: Vec<u8>,
        "Notifying" => notifying: bool,
        "Flags" => flags: Vec<String>,
        "Descriptors" => descriptors: Vec<ObjectPath>,
    }
}

property_table! {
    /// Properties of a GATT descriptor
    GattDescriptor1Properties {
        "UUID" => uuid: String,
        "Characteristic" => characteristic: Option<ObjectPath>,
        "Value" => value: Vec<u8>,
        "Flags" => flags: Vec<String>,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ble_transport::bag;

    #[test]
    fn test_from_bag_reads_known_fields() {
        let props = Device1Properties::from_bag(&bag([
            ("Address", Value::from("AA:BB:CC:DD:EE:FF")),
            ("Connected", Value::Bool(true)),
            ("RSSI", Value::I16(-62)),
            ("UUIDs", Value::List(vec!["0000180f-0000-1000-8000-00805f9b34fb".into()])),
        ]));

        assert_eq!(props.address, "AA:BB:CC:DD:EE:FF");
        assert!(props.connected);
        assert_eq!(props.rssi, Some(-62));
        assert_eq!(props.uuids.len(), 1);
    }

    #[test]
    fn test_apply_reports_outcome() {
        let mut props = Device1Properties::default();
        assert_eq!(props.apply("Connected", &Value::Bool(true)), FieldUpdate::Applied);
        assert_eq!(props.apply("Connected", &Value::from("yes")), FieldUpdate::TypeMismatch);
        assert_eq!(props.apply("Bogus", &Value::Bool(true)), FieldUpdate::Unknown);
        assert!(props.connected);
    }

    #[test]
    fn test_unknown_and_mistyped_entries_are_ignored() {
        let props = GattCharacteristic1Properties::from_bag(&bag([
            ("UUID", Value::from("2a19")),
            ("Value", Value::List(vec![Value::Byte(0x64)])),
            ("MTU", Value::U16(23)),
            ("Notifying", Value::from("no")),
        ]));
        assert_eq!(props.uuid, "2a19");
        assert_eq!(props.value, vec![0x64]);
        assert!(!props.notifying);
    }

    #[test]
    fn test_path_fields() {
        let props = GattService1Properties::from_bag(&bag([
            ("Device", Value::Path(ObjectPath::new("/org/bluez/hci0/dev_AA"))),
            ("Characteristics", Value::List(vec![Value::Path(ObjectPath::new("/c1"))])),
        ]));
        assert_eq!(props.device.unwrap().as_str(), "/org/bluez/hci0/dev_AA");
        assert_eq!(props.characteristics, vec![ObjectPath::new("/c1")]);
    }

    #[test]
    fn test_fields_lists_wire_names() {
        assert!(Device1Properties::FIELDS.contains(&"Connected"));
        assert_eq!(GattDescriptor1Properties::FIELDS.len(), 4);
    }
}
