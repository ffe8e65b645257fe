//! Device facade
//!
//! A `Device` is the handle applications hold for one remote device. It
//! reads properties through the transport, lists its GATT children from
//! the object cache, and scopes event subscriptions to its own
//! `<path>.<kind>` topics.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ble_state::events::topics;
use ble_state::path::is_child_of_kind;
use ble_state::{
    ChangeSynchronizer, Device1Properties, DeviceSnapshot, DomainBus, DomainEvent, EntityKind,
    ObjectCache, RunningSynchronizer, SyncConfig, SyncScope,
};
use ble_transport::{ObjectPath, PropertyBag, Transport, Value};
use event_bus::{Callback, Subscription};
use parking_lot::{Mutex, RwLock};

use crate::error::{Result, SdkError};
use crate::gatt::{Characteristic, Descriptor, GattEntity, GattService};
use crate::registry::RegistryHandle;

/// Everything a device shares with its context
#[derive(Clone)]
pub(crate) struct DeviceParts {
    pub transport: Arc<dyn Transport>,
    pub bus: DomainBus,
    pub cache: ObjectCache,
    pub config: SyncConfig,
}

/// A remote device
pub struct Device {
    path: ObjectPath,
    parts: DeviceParts,
    /// Properties from the last fetch, kept current while watching
    snapshot: DeviceSnapshot,
    /// Child paths by kind, authoritative once populated
    children: Mutex<HashMap<EntityKind, Vec<ObjectPath>>>,
    watcher: Mutex<Option<RunningSynchronizer>>,
    destroyed: AtomicBool,
    registry: RegistryHandle,
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("path", &self.path)
            .field("watching", &self.is_watching())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

impl Device {
    pub(crate) fn new(path: ObjectPath, parts: DeviceParts, properties: Device1Properties, registry: RegistryHandle) -> Self {
        Self {
            path,
            parts,
            snapshot: Arc::new(RwLock::new(properties)),
            children: Mutex::new(HashMap::new()),
            watcher: Mutex::new(None),
            destroyed: AtomicBool::new(false),
            registry,
        }
    }

    /// Builds a device with its current properties from the transport
    pub(crate) fn fetch(path: ObjectPath, parts: DeviceParts, registry: RegistryHandle) -> Result<Self> {
        let bag = parts
            .transport
            .fetch_properties(&path, &parts.config.interfaces.device)?;
        let properties = Device1Properties::from_bag(&bag);
        tracing::debug!("Fetched properties of {} ({})", path, properties.address);
        Ok(Self::new(path, parts, properties, registry))
    }

    pub fn path(&self) -> &ObjectPath {
        &self.path
    }

    fn interface(&self) -> &str {
        &self.parts.config.interfaces.device
    }

    // ========================================================================
    // Properties
    // ========================================================================

    /// Last known properties
    ///
    /// Taken from the object cache when it holds this device, otherwise the
    /// snapshot from the last fetch, which the watcher keeps current.
    pub fn properties(&self) -> Device1Properties {
        match self.parts.cache.properties(&self.path, self.interface()) {
            Some(bag) => Device1Properties::from_bag(&bag),
            None => self.snapshot.read().clone(),
        }
    }

    /// Current properties from the transport
    pub fn get_properties(&self) -> Result<Device1Properties> {
        let bag = self.parts.transport.fetch_properties(&self.path, self.interface())?;
        let properties = Device1Properties::from_bag(&bag);
        *self.snapshot.write() = properties.clone();
        Ok(properties)
    }

    /// One property from the transport; `None` when the device lacks it
    pub fn get_property(&self, name: &str) -> Result<Option<Value>> {
        Ok(self
            .parts
            .transport
            .fetch_property(&self.path, self.interface(), name)?)
    }

    /// Whether the device reports itself connected
    ///
    /// A failed read counts as not connected.
    pub fn is_connected(&self) -> bool {
        match self.get_property("Connected") {
            Ok(value) => value.as_ref().and_then(Value::as_bool).unwrap_or(false),
            Err(e) => {
                tracing::debug!("Could not read Connected of {}: {}", self.path, e);
                false
            }
        }
    }

    // ========================================================================
    // Methods
    // ========================================================================

    fn call(&self, method: &str) -> Result<()> {
        tracing::info!("{} {}", method, self.path);
        self.parts
            .transport
            .invoke(&self.path, self.interface(), method, &[])?;
        Ok(())
    }

    pub fn connect(&self) -> Result<()> {
        self.call("Connect")
    }

    pub fn disconnect(&self) -> Result<()> {
        self.call("Disconnect")
    }

    pub fn pair(&self) -> Result<()> {
        self.call("Pair")
    }

    // ========================================================================
    // GATT children
    // ========================================================================

    /// Paths of this device's children of `kind`
    ///
    /// The first non-empty scan of the cache is kept until
    /// `clear_children`, so later cache updates do not show up here.
    pub fn children_by_prefix(&self, kind: EntityKind) -> Vec<ObjectPath> {
        let mut children = self.children.lock();
        if let Some(paths) = children.get(&kind) {
            return paths.clone();
        }

        let paths: Vec<ObjectPath> = self
            .parts
            .cache
            .get()
            .keys()
            .filter(|path| is_child_of_kind(path, &self.path, kind))
            .cloned()
            .collect();
        tracing::debug!("{}: {} {:?} children", self.path, paths.len(), kind);
        if !paths.is_empty() {
            children.insert(kind, paths.clone());
        }
        paths
    }

    /// Forgets the listed children; the next listing rescans the cache
    pub fn clear_children(&self) {
        self.children.lock().clear();
    }

    fn build<T: GattEntity>(&self, path: ObjectPath) -> Option<T> {
        let interface = T::interface(&self.parts.config.interfaces);
        let bag: PropertyBag = self.parts.cache.properties(&path, interface)?;
        Some(T::from_bag(path, interface, &bag, Arc::clone(&self.parts.transport)))
    }

    fn list<T: GattEntity>(&self) -> Vec<T> {
        self.children_by_prefix(T::KIND)
            .into_iter()
            .filter_map(|path| self.build(path))
            .collect()
    }

    pub fn services(&self) -> Vec<GattService> {
        self.list()
    }

    pub fn characteristics(&self) -> Vec<Characteristic> {
        self.list()
    }

    pub fn descriptors(&self) -> Vec<Descriptor> {
        self.list()
    }

    /// Service at `path`, when it belongs to this device and is cached
    pub fn service(&self, path: &ObjectPath) -> Option<GattService> {
        self.child(path)
    }

    /// Characteristic at `path`, when it belongs to this device and is cached
    pub fn characteristic(&self, path: &ObjectPath) -> Option<Characteristic> {
        self.child(path)
    }

    fn child<T: GattEntity>(&self, path: &ObjectPath) -> Option<T> {
        if !is_child_of_kind(path, &self.path, T::KIND) {
            return None;
        }
        self.build(path.clone())
    }

    /// Characteristic whose UUID matches, ignoring case
    pub fn characteristic_by_uuid(&self, uuid: &str) -> Option<Characteristic> {
        self.characteristics()
            .into_iter()
            .find(|c| c.uuid().eq_ignore_ascii_case(uuid))
    }

    /// `"<UUID>:<service path>"` for every service, UUID upper-cased
    pub fn services_and_uuids(&self) -> Vec<String> {
        self.services()
            .iter()
            .map(|s| format!("{}:{}", s.uuid().to_uppercase(), s.path()))
            .collect()
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Subscribes `callback` to this device's `kind` events
    ///
    /// Subscribing to `changed` starts watching the device's properties.
    pub fn on(&self, kind: &str, callback: &Callback<DomainEvent>) -> Result<Subscription> {
        if self.is_destroyed() {
            return Err(SdkError::DeviceDestroyed(self.path.clone()));
        }
        let topic = topics::scoped(&self.path, kind);
        if kind != topics::CHANGED {
            return Ok(self.parts.bus.subscribe(&topic, callback));
        }

        // The watcher lock covers both steps so a concurrent `off` cannot
        // stop the watcher between them
        let mut watcher = self.watcher.lock();
        self.start_watching(&mut watcher)?;
        Ok(self.parts.bus.subscribe(&topic, callback))
    }

    /// Removes `callback`, or every listener when `None`, from `kind`
    ///
    /// `*` covers every kind of this device. Removing the last `changed`
    /// listener stops watching. Returns the number of listeners removed.
    pub fn off(&self, kind: &str, callback: Option<&Callback<DomainEvent>>) -> usize {
        let pattern = if kind == "*" {
            topics::all_scoped(&self.path)
        } else {
            topics::scoped(&self.path, kind)
        };
        if kind != "*" && kind != topics::CHANGED {
            return self.parts.bus.remove_listeners(&pattern, callback);
        }

        let mut watcher = self.watcher.lock();
        let removed = self.parts.bus.remove_listeners(&pattern, callback);
        if self.changed_listeners() == 0 {
            self.stop_watching(&mut watcher);
        }
        removed
    }

    /// Publishes `event` on this device's `kind` topic
    pub fn emit(&self, kind: &str, event: DomainEvent) {
        self.parts.bus.publish(&topics::scoped(&self.path, kind), event);
    }

    fn changed_listeners(&self) -> usize {
        self.parts
            .bus
            .subscriber_count(&topics::scoped(&self.path, topics::CHANGED))
    }

    /// Starts applying this device's property changes to the cache and
    /// publishing them; does nothing when already watching
    pub fn watch(&self) -> Result<()> {
        self.start_watching(&mut self.watcher.lock())
    }

    pub fn unwatch(&self) {
        self.stop_watching(&mut self.watcher.lock());
    }

    fn start_watching(&self, watcher: &mut Option<RunningSynchronizer>) -> Result<()> {
        if watcher.as_ref().is_some_and(RunningSynchronizer::is_running) {
            return Ok(());
        }
        // A stale watcher still owns the channel for this scope
        if let Some(stale) = watcher.take() {
            stale.stop();
        }

        let running = ChangeSynchronizer::new(
            Arc::clone(&self.parts.transport),
            self.parts.cache.clone(),
            self.parts.bus.clone(),
            SyncScope::Object(self.path.clone()),
            self.parts.config.clone(),
        )
        .with_device_snapshot(Arc::clone(&self.snapshot))
        .start()?;
        tracing::info!("Watching properties of {}", self.path);
        *watcher = Some(running);
        Ok(())
    }

    fn stop_watching(&self, watcher: &mut Option<RunningSynchronizer>) {
        if let Some(running) = watcher.take() {
            running.stop();
            tracing::info!("Stopped watching properties of {}", self.path);
        }
    }

    pub fn is_watching(&self) -> bool {
        self.watcher
            .lock()
            .as_ref()
            .is_some_and(RunningSynchronizer::is_running)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Disconnects, stops watching, drops every listener of this device and
    /// unregisters it
    ///
    /// Only the first call does anything. A failed disconnect is logged and
    /// the rest of the teardown still runs.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            tracing::debug!("Device {} already destroyed", self.path);
            return;
        }
        if let Err(e) = self.disconnect() {
            tracing::warn!("Disconnect of {} failed during destroy: {}", self.path, e);
        }
        self.unwatch();
        let listeners = self.parts.bus.unsubscribe_all(&topics::all_scoped(&self.path));
        self.clear_children();
        self.registry.remove(self);
        tracing::info!("Destroyed device {} ({} listeners removed)", self.path, listeners);
    }
}
