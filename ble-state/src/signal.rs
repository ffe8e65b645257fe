//! Decoding raw transport signals into lifecycle changes

use ble_transport::{
    InterfaceMap, ObjectPath, PropertyBag, Signal, Value, INTERFACES_ADDED, INTERFACES_REMOVED,
    PROPERTIES_CHANGED,
};

use crate::error::{Result, StateError};

/// A signal the synchronizer knows how to apply
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleSignal {
    InterfacesAdded {
        path: ObjectPath,
        interfaces: InterfaceMap,
    },
    InterfacesRemoved {
        path: ObjectPath,
        interfaces: Vec<String>,
    },
    PropertiesChanged {
        path: ObjectPath,
        interface: String,
        changed: PropertyBag,
        invalidated: Vec<String>,
    },
}

/// Decode a signal, rejecting unknown names and unexpected body shapes
pub fn decode(signal: &Signal) -> Result<LifecycleSignal> {
    let name = signal.name.as_str();
    match name {
        INTERFACES_ADDED => {
            let path = object_arg(signal)?;
            let dict = arg(signal, 1)?
                .as_dict()
                .ok_or_else(|| StateError::malformed(name, "argument 1 is not a dict"))?;

            let mut interfaces = InterfaceMap::with_capacity(dict.len());
            for (iface, props) in dict {
                let props = props.as_dict().ok_or_else(|| {
                    StateError::malformed(name, format!("properties of {} are not a dict", iface))
                })?;
                interfaces.insert(iface.clone(), props.clone());
            }
            Ok(LifecycleSignal::InterfacesAdded { path, interfaces })
        }
        INTERFACES_REMOVED => {
            let path = object_arg(signal)?;
            let interfaces = arg(signal, 1)?
                .as_string_list()
                .ok_or_else(|| StateError::malformed(name, "argument 1 is not a string list"))?;
            Ok(LifecycleSignal::InterfacesRemoved { path, interfaces })
        }
        PROPERTIES_CHANGED => {
            let interface = arg(signal, 0)?
                .as_str()
                .ok_or_else(|| StateError::malformed(name, "argument 0 is not a string"))?
                .to_string();
            let changed = arg(signal, 1)?
                .as_dict()
                .ok_or_else(|| StateError::malformed(name, "argument 1 is not a dict"))?
                .clone();
            let invalidated = match signal.body.get(2) {
                Some(v) => v
                    .as_string_list()
                    .ok_or_else(|| StateError::malformed(name, "argument 2 is not a string list"))?,
                None => Vec::new(),
            };
            Ok(LifecycleSignal::PropertiesChanged {
                path: signal.path.clone(),
                interface,
                changed,
                invalidated,
            })
        }
        other => Err(StateError::malformed(other, "unsupported signal")),
    }
}

fn arg(signal: &Signal, index: usize) -> Result<&Value> {
    signal
        .body
        .get(index)
        .ok_or_else(|| StateError::malformed(&signal.name, format!("missing argument {}", index)))
}

fn object_arg(signal: &Signal) -> Result<ObjectPath> {
    arg(signal, 0)?
        .as_path()
        .ok_or_else(|| StateError::malformed(&signal.name, "argument 0 is not an object path"))
}
