//! Path algebra for BlueZ-style object trees
//!
//! Entities nest by path:
//!
//! ```text
//! /org/bluez/hci0                                     adapter
//! /org/bluez/hci0/dev_AA_BB                           device
//! /org/bluez/hci0/dev_AA_BB/service000a               service      (device + 1)
//! /org/bluez/hci0/dev_AA_BB/service000a/char000b      characteristic (device + 2)
//! /org/bluez/hci0/dev_AA_BB/service000a/char000b/desc000d  descriptor (device + 3)
//! ```
//!
//! Every segment-count assumption lives in this module.

use ble_transport::ObjectPath;

/// Kind of entity found in the object tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Device,
    Adapter,
    Service,
    Characteristic,
    Descriptor,
}

impl EntityKind {
    /// Fixed order in which domain events for one object are published
    pub const ORDER: [EntityKind; 5] = [
        EntityKind::Device,
        EntityKind::Adapter,
        EntityKind::Service,
        EntityKind::Characteristic,
        EntityKind::Descriptor,
    ];

    /// Segments between an entity of this kind and its owning device
    pub fn depth_below_device(&self) -> Option<usize> {
        match self {
            EntityKind::Device => Some(0),
            EntityKind::Service => Some(1),
            EntityKind::Characteristic => Some(2),
            EntityKind::Descriptor => Some(3),
            EntityKind::Adapter => None,
        }
    }
}

/// Path of the device that owns `path`, an entity of `kind`
///
/// `None` for adapters and for paths too short to have an owner.
pub fn owning_device(kind: EntityKind, path: &ObjectPath) -> Option<ObjectPath> {
    path.trim_segments(kind.depth_below_device()?)
}

/// Adapter name, the last segment of its path (`hci0`)
pub fn adapter_name(path: &ObjectPath) -> Option<&str> {
    path.last_segment()
}

/// Whether `path` is a descendant of `device` of the given kind, judged by
/// the segment names below the device
pub fn is_child_of_kind(path: &ObjectPath, device: &ObjectPath, kind: EntityKind) -> bool {
    if !path.is_descendant_of(device) {
        return false;
    }
    let depth = device.segments().count();
    let relative: Vec<&str> = path.segments().skip(depth).collect();
    let has = |prefix: &str| relative.iter().any(|s| s.starts_with(prefix));

    match kind {
        EntityKind::Service => {
            relative.last().is_some_and(|s| s.starts_with("service")) && !has("char")
        }
        EntityKind::Characteristic => has("char") && !has("desc"),
        EntityKind::Descriptor => has("desc"),
        EntityKind::Device | EntityKind::Adapter => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const DEVICE: &str = "/org/bluez/hci0/dev_AA_BB";

    #[rstest]
    #[case(EntityKind::Device, "/org/bluez/hci0/dev_AA_BB", Some(DEVICE))]
    #[case(EntityKind::Service, "/org/bluez/hci0/dev_AA_BB/service000a", Some(DEVICE))]
    #[case(EntityKind::Characteristic, "/org/bluez/hci0/dev_AA_BB/service000a/char000b", Some(DEVICE))]
    #[case(EntityKind::Descriptor, "/org/bluez/hci0/dev_AA_BB/service000a/char000b/desc000d", Some(DEVICE))]
    #[case(EntityKind::Adapter, "/org/bluez/hci0", None)]
    #[case(EntityKind::Descriptor, "/desc", None)]
    fn test_owning_device(#[case] kind: EntityKind, #[case] path: &str, #[case] expected: Option<&str>) {
        let owner = owning_device(kind, &ObjectPath::new(path));
        assert_eq!(owner.as_ref().map(ObjectPath::as_str), expected);
    }

    #[test]
    fn test_adapter_name() {
        assert_eq!(adapter_name(&ObjectPath::new("/org/bluez/hci0")), Some("hci0"));
    }

    #[rstest]
    #[case("/org/bluez/hci0/dev_AA_BB/service1", EntityKind::Service, true)]
    #[case("/org/bluez/hci0/dev_AA_BB/service1/char2", EntityKind::Service, false)]
    #[case("/org/bluez/hci0/dev_AA_BB/service1/char2", EntityKind::Characteristic, true)]
    #[case("/org/bluez/hci0/dev_AA_BB/service1/char2/desc3", EntityKind::Characteristic, false)]
    #[case("/org/bluez/hci0/dev_AA_BB/service1/char2/desc3", EntityKind::Descriptor, true)]
    #[case("/org/bluez/hci0/dev_AA_BB", EntityKind::Characteristic, false)]
    #[case("/org/bluez/hci0/dev_AA_BBB/service1/char2", EntityKind::Characteristic, false)]
    #[case("/org/bluez/hci0/dev_CC/service1/char2", EntityKind::Characteristic, false)]
    fn test_is_child_of_kind(#[case] path: &str, #[case] kind: EntityKind, #[case] expected: bool) {
        let device = ObjectPath::new(DEVICE);
        assert_eq!(is_child_of_kind(&ObjectPath::new(path), &device, kind), expected);
    }

    #[test]
    fn test_device_name_containing_char_is_not_confused() {
        let device = ObjectPath::new("/org/bluez/hci0/dev_charger");
        let service = ObjectPath::new("/org/bluez/hci0/dev_charger/service1");
        assert!(!is_child_of_kind(&service, &device, EntityKind::Characteristic));
        assert!(is_child_of_kind(&service, &device, EntityKind::Service));
    }
}
