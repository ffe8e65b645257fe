//! Signals emitted by the remote service
//!
//! Signal bodies follow the object-manager conventions:
//!
//! | name                  | `path`           | `body`                                        |
//! |-----------------------|------------------|-----------------------------------------------|
//! | `INTERFACES_ADDED`    | the manager      | `[Path(object), Dict(iface -> Dict(props))]`  |
//! | `INTERFACES_REMOVED`  | the manager      | `[Path(object), List(Str(iface))]`            |
//! | `PROPERTIES_CHANGED`  | the object       | `[Str(iface), Dict(changed), List(invalid)]`  |

use serde::{Deserialize, Serialize};

use crate::path::ObjectPath;
use crate::value::{InterfaceMap, PropertyBag, Value};

pub const INTERFACES_ADDED: &str = "org.freedesktop.DBus.ObjectManager.InterfacesAdded";
pub const INTERFACES_REMOVED: &str = "org.freedesktop.DBus.ObjectManager.InterfacesRemoved";
pub const PROPERTIES_CHANGED: &str = "org.freedesktop.DBus.Properties.PropertiesChanged";

/// One notification from the remote service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Signal name, one of the constants in this module for signals the
    /// core understands
    pub name: String,
    /// Object that emitted the signal
    pub path: ObjectPath,
    /// Arguments, shaped according to `name`
    pub body: Vec<Value>,
}

impl Signal {
    pub fn new(name: impl Into<String>, path: ObjectPath, body: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            path,
            body,
        }
    }

    /// `object` appeared (or gained interfaces)
    pub fn interfaces_added(object: ObjectPath, interfaces: InterfaceMap) -> Self {
        let dict = interfaces
            .into_iter()
            .map(|(iface, props)| (iface, Value::Dict(props)))
            .collect();
        Self::new(
            INTERFACES_ADDED,
            ObjectPath::root(),
            vec![Value::Path(object), Value::Dict(dict)],
        )
    }

    /// `object` lost the listed interfaces
    pub fn interfaces_removed<S: AsRef<str>>(object: ObjectPath, interfaces: &[S]) -> Self {
        let list = interfaces
            .iter()
            .map(|iface| Value::Str(iface.as_ref().to_string()))
            .collect();
        Self::new(
            INTERFACES_REMOVED,
            ObjectPath::root(),
            vec![Value::Path(object), Value::List(list)],
        )
    }

    /// Properties of `interface` on `object` changed
    pub fn properties_changed(object: ObjectPath, interface: &str, changed: PropertyBag) -> Self {
        Self::new(
            PROPERTIES_CHANGED,
            object,
            vec![
                Value::Str(interface.to_string()),
                Value::Dict(changed),
                Value::List(Vec::new()),
            ],
        )
    }
}

/// What a signal channel listens to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalScope {
    /// Object lifecycle for the whole tree
    Tree,
    /// Property changes of one object
    Object(ObjectPath),
}

impl std::fmt::Display for SignalScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalScope::Tree => f.write_str("tree"),
            SignalScope::Object(path) => write!(f, "object {}", path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::bag;

    #[test]
    fn test_interfaces_added_shape() {
        let mut ifaces = InterfaceMap::new();
        ifaces.insert("org.bluez.Device1".to_string(), bag([("Connected", false)]));
        let signal = Signal::interfaces_added(ObjectPath::new("/org/bluez/hci0/dev_AA"), ifaces);

        assert_eq!(signal.name, INTERFACES_ADDED);
        assert_eq!(signal.body.len(), 2);
        assert_eq!(signal.body[0].as_str(), Some("/org/bluez/hci0/dev_AA"));
        let dict = signal.body[1].as_dict().unwrap();
        assert!(dict["org.bluez.Device1"].as_dict().is_some());
    }

    #[test]
    fn test_properties_changed_targets_object() {
        let path = ObjectPath::new("/org/bluez/hci0/dev_AA");
        let signal = Signal::properties_changed(path.clone(), "org.bluez.Device1", bag([("RSSI", -40i16)]));
        assert_eq!(signal.path, path);
        assert_eq!(signal.body[0].as_str(), Some("org.bluez.Device1"));
    }
}
