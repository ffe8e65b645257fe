//! Device facade behavior against the in-memory transport

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ble_sdk::{
    bluez, BleContext, Callback, ContextConfig, Device, DomainEvent, EntityKind, ObjectPath,
    Transport, Value,
};
use ble_transport::{bag, InterfaceMap, MemoryTransport, ObjectTree, PropertyBag, SignalReceiver, SignalScope};
use crossbeam::channel::{self, Receiver};
use proptest::prelude::*;
use rstest::rstest;

const DEVICE: &str = "/org/bluez/hci0/dev_AA";
const OTHER: &str = "/org/bluez/hci0/dev_BB";
const BATTERY_SERVICE: &str = "/org/bluez/hci0/dev_AA/service0010";
const BATTERY_LEVEL: &str = "/org/bluez/hci0/dev_AA/service0010/char0011";
const BATTERY_CCCD: &str = "/org/bluez/hci0/dev_AA/service0010/char0011/desc0013";
const INFO_SERVICE: &str = "/org/bluez/hci0/dev_AA/service0020";
const MODEL_NUMBER: &str = "/org/bluez/hci0/dev_AA/service0020/char0021";

const BATTERY_LEVEL_UUID: &str = "00002a19-0000-1000-8000-00805f9b34fb";

fn object(interface: &str, props: PropertyBag) -> InterfaceMap {
    InterfaceMap::from([(interface.to_string(), props)])
}

fn uuid(value: &str) -> PropertyBag {
    bag([("UUID", Value::from(value))])
}

fn populated_transport() -> Arc<MemoryTransport> {
    let transport = Arc::new(MemoryTransport::new());
    for path in [DEVICE, OTHER] {
        transport.insert_object(
            path,
            object(
                bluez::DEVICE1,
                bag([("Address", Value::from(path)), ("Connected", Value::Bool(false))]),
            ),
        );
    }
    transport.insert_object(BATTERY_SERVICE, object(bluez::GATT_SERVICE1, uuid("0000180f-0000-1000-8000-00805f9b34fb")));
    transport.insert_object(BATTERY_LEVEL, object(bluez::GATT_CHARACTERISTIC1, uuid(BATTERY_LEVEL_UUID)));
    transport.insert_object(BATTERY_CCCD, object(bluez::GATT_DESCRIPTOR1, uuid("00002902-0000-1000-8000-00805f9b34fb")));
    transport.insert_object(INFO_SERVICE, object(bluez::GATT_SERVICE1, uuid("0000180a-0000-1000-8000-00805f9b34fb")));
    transport.insert_object(MODEL_NUMBER, object(bluez::GATT_CHARACTERISTIC1, uuid("00002a24-0000-1000-8000-00805f9b34fb")));
    transport.insert_object(
        "/org/bluez/hci0/dev_BB/service0010/char0011",
        object(bluez::GATT_CHARACTERISTIC1, uuid(BATTERY_LEVEL_UUID)),
    );
    transport
}

struct Harness {
    transport: Arc<MemoryTransport>,
    context: BleContext,
}

impl Harness {
    /// Context that has not loaded the tree yet
    fn idle() -> Self {
        let transport = populated_transport();
        let context = BleContext::new(
            Arc::clone(&transport) as Arc<dyn Transport>,
            ContextConfig::deterministic(),
        )
        .unwrap();
        Self { transport, context }
    }

    /// Context with the tree loaded and followed
    fn started() -> Self {
        let h = Self::idle();
        h.context.start().unwrap();
        h
    }

    fn device(&self) -> Arc<Device> {
        self.context.device(DEVICE).unwrap()
    }
}

fn forwarding() -> (Callback<DomainEvent>, Receiver<DomainEvent>) {
    let (tx, rx) = channel::unbounded();
    let callback = Callback::from_fn(move |event: &event_bus::Event<DomainEvent>| {
        let _ = tx.send(event.payload().clone());
    });
    (callback, rx)
}

fn wait_until(check: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    check()
}

fn paths<T>(items: &[T], path: impl Fn(&T) -> &ObjectPath) -> Vec<String> {
    items.iter().map(|i| path(i).to_string()).collect()
}

// ============================================================================
// Resolution and lifecycle
// ============================================================================

#[test]
fn test_resolve_returns_same_instance() {
    let h = Harness::started();
    let a = h.device();
    let b = h.context.device(ObjectPath::new(DEVICE)).unwrap();

    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(h.context.devices().len(), 1);
}

#[test]
fn test_concurrent_resolve_yields_one_instance() {
    let h = Harness::started();
    let devices: Vec<Arc<Device>> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8).map(|_| s.spawn(|| h.device())).collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });

    assert!(devices.iter().all(|d| Arc::ptr_eq(d, &devices[0])));
    assert_eq!(h.context.devices().len(), 1);
}

#[test]
fn test_destroy_unregisters_and_next_resolve_is_fresh() {
    let h = Harness::started();
    let first = h.device();
    h.context.clear_device(&first);

    assert!(first.is_destroyed());
    assert!(h.context.registered_device(first.path()).is_none());

    let second = h.device();
    assert!(!Arc::ptr_eq(&first, &second));
    assert!(!second.is_destroyed());
}

#[test]
fn test_destroy_runs_once() {
    let h = Harness::started();
    let device = h.device();
    let (callback, _rx) = forwarding();
    device.on("changed", &callback).unwrap();
    device.on("char", &callback).unwrap();

    device.destroy();
    device.destroy();

    let path = ObjectPath::new(DEVICE);
    assert_eq!(h.transport.call_count(&path, "Disconnect"), 1);
    assert!(!device.is_watching());
    assert!(!h.transport.is_channel_open(&SignalScope::Object(path)));
    assert!(h.context.bus().topics().iter().all(|t| !t.starts_with(DEVICE)));
}

#[test]
fn test_destroy_of_stale_instance_keeps_newer_registration() {
    let h = Harness::started();
    let first = h.device();
    first.destroy();
    let second = h.device();

    // A second destroy of the old instance must not unregister the new one
    first.destroy();
    let again = h.device();
    assert!(Arc::ptr_eq(&second, &again));
}

// ============================================================================
// GATT children
// ============================================================================

#[test]
fn test_characteristics_exclude_descriptors_and_other_devices() {
    let h = Harness::started();
    let device = h.device();

    let chars = device.characteristics();
    assert_eq!(paths(&chars, |c| c.path()), vec![BATTERY_LEVEL, MODEL_NUMBER]);

    let services = device.services();
    assert_eq!(paths(&services, |s| s.path()), vec![BATTERY_SERVICE, INFO_SERVICE]);

    let descriptors = device.descriptors();
    assert_eq!(paths(&descriptors, |d| d.path()), vec![BATTERY_CCCD]);
}

#[test]
fn test_children_are_kept_until_cleared() {
    let h = Harness::started();
    let device = h.device();
    assert_eq!(device.children_by_prefix(EntityKind::Characteristic).len(), 2);

    let late = ObjectPath::new("/org/bluez/hci0/dev_AA/service0020/char0023");
    h.context.cache().apply_added(
        &late,
        object(bluez::GATT_CHARACTERISTIC1, uuid("00002a25-0000-1000-8000-00805f9b34fb")),
    );
    assert_eq!(device.characteristics().len(), 2);

    device.clear_children();
    let chars = device.characteristics();
    assert_eq!(chars.len(), 3);
    assert!(chars.iter().any(|c| c.path() == &late));
}

#[rstest]
#[case::lower("00002a19-0000-1000-8000-00805f9b34fb", Some(BATTERY_LEVEL))]
#[case::upper("00002A19-0000-1000-8000-00805F9B34FB", Some(BATTERY_LEVEL))]
#[case::mixed("00002A19-0000-1000-8000-00805f9b34FB", Some(BATTERY_LEVEL))]
#[case::other_characteristic("00002a24-0000-1000-8000-00805f9b34fb", Some(MODEL_NUMBER))]
#[case::descriptor_uuid("00002902-0000-1000-8000-00805f9b34fb", None)]
#[case::absent("0000ffff-0000-1000-8000-00805f9b34fb", None)]
fn test_characteristic_by_uuid(#[case] uuid: &str, #[case] expected: Option<&str>) {
    let h = Harness::started();
    let found = h.device().characteristic_by_uuid(uuid);
    assert_eq!(found.as_ref().map(|c| c.path().as_str()), expected);
}

/// One generated GATT path below `device`: service, optional characteristic
/// and optional descriptor indices
fn gatt_path(device: &str, service: u8, characteristic: Option<u8>, descriptor: Option<u8>) -> String {
    let mut path = format!("{}/service{:04x}", device, service);
    if let Some(c) = characteristic {
        path.push_str(&format!("/char{:04x}", c));
        if let Some(d) = descriptor {
            path.push_str(&format!("/desc{:04x}", d));
        }
    }
    path
}

fn gatt_paths() -> impl Strategy<Value = Vec<(bool, u8, Option<u8>, Option<u8>)>> {
    prop::collection::vec(
        (any::<bool>(), 0u8..4, prop::option::of(0u8..4), prop::option::of(0u8..4)),
        0..24,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_children_are_classified_by_segment(entries in gatt_paths()) {
        let h = Harness::idle();
        let device = h.context.device(DEVICE).unwrap();

        let mut expected: [BTreeSet<String>; 3] = Default::default();
        for (mine, service, characteristic, descriptor) in entries {
            let owner = if mine { DEVICE } else { OTHER };
            let path = gatt_path(owner, service, characteristic, descriptor);
            let (interface, slot) = match (characteristic, descriptor) {
                (None, _) => (bluez::GATT_SERVICE1, 0),
                (Some(_), None) => (bluez::GATT_CHARACTERISTIC1, 1),
                (Some(_), Some(_)) => (bluez::GATT_DESCRIPTOR1, 2),
            };
            if mine {
                expected[slot].insert(path.clone());
            }
            h.context
                .cache()
                .apply_added(&ObjectPath::new(path.as_str()), object(interface, uuid(BATTERY_LEVEL_UUID)));
        }

        for (slot, kind) in [EntityKind::Service, EntityKind::Characteristic, EntityKind::Descriptor]
            .into_iter()
            .enumerate()
        {
            let found: BTreeSet<String> = device
                .children_by_prefix(kind)
                .iter()
                .map(|p| p.to_string())
                .collect();
            prop_assert_eq!(&found, &expected[slot], "{:?}", kind);
        }
    }
}

#[test]
fn test_services_and_uuids() {
    let h = Harness::started();
    assert_eq!(
        h.device().services_and_uuids(),
        vec![
            format!("0000180F-0000-1000-8000-00805F9B34FB:{}", BATTERY_SERVICE),
            format!("0000180A-0000-1000-8000-00805F9B34FB:{}", INFO_SERVICE),
        ]
    );
}

#[test]
fn test_child_lookup_is_scoped_to_device() {
    let h = Harness::started();
    let device = h.device();

    assert!(device.characteristic(&ObjectPath::new(MODEL_NUMBER)).is_some());
    assert!(device
        .characteristic(&ObjectPath::new("/org/bluez/hci0/dev_BB/service0010/char0011"))
        .is_none());
    assert!(device.service(&ObjectPath::new(BATTERY_SERVICE)).is_some());
    assert!(device.service(&ObjectPath::new(BATTERY_LEVEL)).is_none());
}

#[test]
fn test_characteristic_read_through_device() {
    let h = Harness::started();
    h.transport.respond(bluez::GATT_CHARACTERISTIC1, "ReadValue", vec![Value::Bytes(vec![87])]);

    let level = h.device().characteristic_by_uuid(BATTERY_LEVEL_UUID).unwrap();
    assert_eq!(level.read_value(None).unwrap(), vec![87]);
}

// ============================================================================
// Events
// ============================================================================

#[test]
fn test_changed_listener_receives_property_changes() {
    let h = Harness::started();
    let device = h.device();
    let (callback, rx) = forwarding();
    device.on("changed", &callback).unwrap();
    assert!(device.is_watching());

    h.transport
        .set_properties(DEVICE, bluez::DEVICE1, bag([("Connected", Value::Bool(true))]));

    let event = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    let DomainEvent::PropertyChanged(change) = event else {
        panic!("expected a property change, got {:?}", event);
    };
    assert_eq!(change.field, "Connected");
    assert_eq!(change.value, Value::Bool(true));
    assert!(change.properties.unwrap().connected);
    assert!(device.properties().connected);
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
}

#[test]
fn test_watching_stops_with_last_changed_listener() {
    let h = Harness::started();
    let device = h.device();
    let (first, _rx1) = forwarding();
    let (second, _rx2) = forwarding();
    device.on("changed", &first).unwrap();
    device.on("changed", &second).unwrap();

    assert_eq!(device.off("changed", Some(&first)), 1);
    assert!(device.is_watching());

    assert_eq!(device.off("changed", Some(&second)), 1);
    assert!(!device.is_watching());
    assert!(!h.transport.is_channel_open(&SignalScope::Object(ObjectPath::new(DEVICE))));
}

#[test]
fn test_changed_on_uncached_device_keeps_fetched_properties() {
    // Not started: the cache does not hold the device
    let h = Harness::idle();
    let device = h.device();
    let (callback, rx) = forwarding();
    device.on("changed", &callback).unwrap();
    assert!(!h.context.cache().contains(&ObjectPath::new(DEVICE)));

    h.transport
        .set_properties(DEVICE, bluez::DEVICE1, bag([("Connected", Value::Bool(true))]));

    let event = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    let DomainEvent::PropertyChanged(change) = event else {
        panic!("expected a property change, got {:?}", event);
    };
    let props = change.properties.unwrap();
    assert_eq!(props.address, DEVICE);
    assert!(props.connected);
    assert!(device.properties().connected);
    assert_eq!(device.properties().address, DEVICE);
}

#[test]
fn test_concurrent_on_and_off_keep_watching_with_listeners() {
    let h = Harness::started();
    let device = h.device();
    let (first, _rx1) = forwarding();
    let (second, _rx2) = forwarding();

    for _ in 0..30 {
        device.on("changed", &first).unwrap();
        thread::scope(|s| {
            s.spawn(|| device.on("changed", &second).unwrap());
            s.spawn(|| device.off("changed", Some(&first)));
        });
        assert!(device.is_watching(), "a changed listener is left but watching stopped");

        device.off("changed", Some(&second));
        assert!(!device.is_watching());
    }
}

#[test]
fn test_off_other_kind_keeps_explicit_watch() {
    let h = Harness::started();
    let device = h.device();
    device.watch().unwrap();
    let (callback, _rx) = forwarding();
    device.on("service", &callback).unwrap();

    assert_eq!(device.off("service", None), 1);
    assert!(device.is_watching());
}

#[test]
fn test_off_star_removes_everything() {
    let h = Harness::started();
    let device = h.device();
    let (callback, _rx) = forwarding();
    device.on("changed", &callback).unwrap();
    device.on("char", &callback).unwrap();
    device.on("service", &callback).unwrap();

    assert_eq!(device.off("*", None), 3);
    assert!(!device.is_watching());
    assert!(h.context.bus().topics().iter().all(|t| !t.starts_with(DEVICE)));
}

#[test]
fn test_emit_reaches_device_scoped_listener() {
    let h = Harness::started();
    let device = h.device();
    let (callback, rx) = forwarding();
    device.on("data", &callback).unwrap();

    device.emit("data", DomainEvent::Custom(Value::Byte(42)));

    assert_eq!(
        rx.recv_timeout(Duration::from_secs(2)).unwrap(),
        DomainEvent::Custom(Value::Byte(42))
    );
}

/// Every tree fetch after the first removes `DEVICE` remotely while the
/// fetched tree still lists it
struct StaleTreeTransport {
    inner: Arc<MemoryTransport>,
    fetches: AtomicUsize,
}

impl Transport for StaleTreeTransport {
    fn fetch_object_tree(&self) -> ble_transport::Result<ObjectTree> {
        let tree = self.inner.fetch_object_tree()?;
        if self.fetches.fetch_add(1, Ordering::SeqCst) > 0 {
            self.inner.remove_object(DEVICE);
            thread::sleep(Duration::from_millis(50));
        }
        Ok(tree)
    }

    fn open_signal_channel(&self, scope: &SignalScope) -> ble_transport::Result<SignalReceiver> {
        self.inner.open_signal_channel(scope)
    }

    fn close_signal_channel(&self, scope: &SignalScope) -> ble_transport::Result<()> {
        self.inner.close_signal_channel(scope)
    }

    fn fetch_properties(&self, path: &ObjectPath, interface: &str) -> ble_transport::Result<PropertyBag> {
        self.inner.fetch_properties(path, interface)
    }

    fn fetch_property(&self, path: &ObjectPath, interface: &str, name: &str) -> ble_transport::Result<Option<Value>> {
        self.inner.fetch_property(path, interface, name)
    }

    fn invoke(&self, path: &ObjectPath, interface: &str, method: &str, args: &[Value]) -> ble_transport::Result<Vec<Value>> {
        self.inner.invoke(path, interface, method, args)
    }
}

#[test]
fn test_refresh_state_keeps_removal_seen_during_fetch() {
    let transport = Arc::new(StaleTreeTransport {
        inner: populated_transport(),
        fetches: AtomicUsize::new(0),
    });
    let context = BleContext::new(transport, ContextConfig::deterministic()).unwrap();
    context.start().unwrap();
    let device = ObjectPath::new(DEVICE);
    assert!(context.cache().contains(&device));

    context.refresh_state().unwrap();

    assert!(wait_until(|| !context.cache().contains(&device)));
    thread::sleep(Duration::from_millis(50));
    assert!(!context.cache().contains(&device));
    assert!(context.cache().contains(&ObjectPath::new(OTHER)));
}

#[test]
fn test_refresh_state_republishes_devices() {
    let h = Harness::started();
    let discovery = h.context.bus().iter("discovery");

    h.context.refresh_state().unwrap();

    let seen: Vec<ObjectPath> = discovery
        .timeout_iter(Duration::from_millis(300))
        .filter_map(|event| event.payload().path().cloned())
        .collect();
    assert_eq!(seen, vec![ObjectPath::new(DEVICE), ObjectPath::new(OTHER)]);
}
