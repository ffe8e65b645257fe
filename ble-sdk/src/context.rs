//! BleContext - entry point of the SDK
//!
//! Owns the event bus, the object cache, the tree synchronizer and the
//! device registry. Contexts are plain values: build as many as needed,
//! each with its own transport.

use std::sync::Arc;

use ble_state::{
    ChangeSynchronizer, Device1Properties, DomainBus, DomainPublisher, ObjectCache,
    RunningSynchronizer, SyncScope,
};
use ble_transport::{ObjectPath, PropertyBag, Transport};
use parking_lot::Mutex;

use crate::config::ContextConfig;
use crate::device::{Device, DeviceParts};
use crate::error::Result;
use crate::registry::{DeviceRegistry, RegistryHandle};

/// Sync-first handle on one remote object tree
///
/// # Example
///
/// ```rust,ignore
/// use ble_sdk::{BleContext, ContextConfig};
///
/// let context = BleContext::new(transport, ContextConfig::default())?;
/// let discovery = context.bus().iter("discovery");
/// context.start()?;
///
/// for event in discovery.timeout_iter(std::time::Duration::from_secs(10)) {
///     if let Some(path) = event.payload().path() {
///         let device = context.device(path.clone())?;
///         println!("{} {}", device.path(), device.properties().address);
///     }
/// }
/// ```
pub struct BleContext {
    parts: DeviceParts,
    config: ContextConfig,
    registry: DeviceRegistry,
    synchronizer: Mutex<Option<RunningSynchronizer>>,
}

impl std::fmt::Debug for BleContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BleContext")
            .field("running", &self.is_running())
            .field("devices", &self.registry.len())
            .field("cached_objects", &self.parts.cache.len())
            .finish()
    }
}

impl BleContext {
    /// Builds bus, cache and registry; nothing talks to the transport yet
    pub fn new(transport: Arc<dyn Transport>, config: ContextConfig) -> Result<Self> {
        config.validate()?;
        let bus = DomainBus::with_config(config.bus.clone())?;
        let cache = ObjectCache::new(Arc::clone(&transport));
        Ok(Self {
            parts: DeviceParts {
                transport,
                bus,
                cache,
                config: config.sync.clone(),
            },
            config,
            registry: DeviceRegistry::new(),
            synchronizer: Mutex::new(None),
        })
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Loads the object tree and starts following its changes
    ///
    /// Does nothing when already running. Failure leaves the context
    /// stopped and is meant to be treated as fatal.
    pub fn start(&self) -> Result<()> {
        let mut synchronizer = self.synchronizer.lock();
        if synchronizer.as_ref().is_some_and(RunningSynchronizer::is_running) {
            tracing::debug!("BleContext already running");
            return Ok(());
        }
        if let Some(stale) = synchronizer.take() {
            stale.stop();
        }

        let running = ChangeSynchronizer::new(
            Arc::clone(&self.parts.transport),
            self.parts.cache.clone(),
            self.parts.bus.clone(),
            SyncScope::Tree,
            self.parts.config.clone(),
        )
        .start()?;
        tracing::info!("BleContext started with {} cached objects", self.parts.cache.len());
        *synchronizer = Some(running);
        Ok(())
    }

    /// Stops following tree changes; devices keep their own watchers
    pub fn stop(&self) {
        if let Some(running) = self.synchronizer.lock().take() {
            running.stop();
            tracing::info!("BleContext stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.synchronizer
            .lock()
            .as_ref()
            .is_some_and(RunningSynchronizer::is_running)
    }

    /// Reloads the tree and publishes an added event for every object in it
    pub fn refresh_state(&self) -> Result<()> {
        let tree = self.parts.cache.load()?;
        DomainPublisher::new(self.parts.bus.clone(), self.parts.config.interfaces.clone()).republish(&tree);
        tracing::info!("Refreshed state, {} objects", tree.len());
        Ok(())
    }

    // ========================================================================
    // Devices
    // ========================================================================

    /// The device at `path`, fetching its properties on first use
    ///
    /// Every call for the same path returns the same instance until that
    /// device is destroyed.
    pub fn device(&self, path: impl Into<ObjectPath>) -> Result<Arc<Device>> {
        let path = path.into();
        self.registry
            .resolve(&path, |handle| Device::fetch(path.clone(), self.parts.clone(), handle))
    }

    /// Registered device at `path`, without resolving it
    pub fn registered_device(&self, path: &ObjectPath) -> Option<Arc<Device>> {
        self.registry.get(path)
    }

    /// Registered devices in path order
    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.registry.all()
    }

    /// Paths of every device in the object cache
    pub fn discovered_devices(&self) -> Vec<ObjectPath> {
        self.parts
            .cache
            .paths_with_interface(&self.config.sync.interfaces.device)
    }

    /// Destroys `device`, removing it from the registry
    pub fn clear_device(&self, device: &Device) {
        device.destroy();
    }

    /// A device view built from `bag`, not registered and not fetched
    pub fn parse_device(&self, path: impl Into<ObjectPath>, bag: &PropertyBag) -> Device {
        Device::new(
            path.into(),
            self.parts.clone(),
            Device1Properties::from_bag(bag),
            RegistryHandle::detached(),
        )
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn bus(&self) -> &DomainBus {
        &self.parts.bus
    }

    pub fn cache(&self) -> &ObjectCache {
        &self.parts.cache
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.parts.transport
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ble_state::bluez;
    use ble_transport::{bag, InterfaceMap, MemoryTransport, TransportError, Value};

    fn context() -> (Arc<MemoryTransport>, BleContext) {
        let transport = Arc::new(MemoryTransport::new());
        let context = BleContext::new(
            Arc::clone(&transport) as Arc<dyn Transport>,
            ContextConfig::deterministic(),
        )
        .unwrap();
        (transport, context)
    }

    #[test]
    fn test_start_is_idempotent_and_stop_closes_channel() {
        let (transport, context) = context();
        context.start().unwrap();
        context.start().unwrap();
        assert!(context.is_running());
        assert_eq!(transport.tree_fetches(), 1);

        context.stop();
        assert!(!context.is_running());
        assert!(!transport.is_channel_open(&SyncScope::Tree));
    }

    #[test]
    fn test_start_failure_leaves_context_stopped() {
        let (transport, context) = context();
        transport.set_tree_fetch_error(Some(TransportError::Disconnected("bus gone".into())));

        assert!(context.start().is_err());
        assert!(!context.is_running());
    }

    #[test]
    fn test_parse_device_is_not_registered() {
        let (_transport, context) = context();
        let device = context.parse_device(
            "/org/bluez/hci0/dev_AA",
            &bag([("Address", Value::from("AA")), ("RSSI", Value::I16(-40))]),
        );

        assert_eq!(device.properties().rssi, Some(-40));
        assert!(context.devices().is_empty());
    }

    #[test]
    fn test_discovered_devices_come_from_cache() {
        let (transport, context) = context();
        transport.insert_object(
            "/org/bluez/hci0/dev_AA",
            InterfaceMap::from([(bluez::DEVICE1.to_string(), bag([("Address", Value::from("AA"))]))]),
        );
        assert!(context.discovered_devices().is_empty());

        context.start().unwrap();
        assert_eq!(
            context.discovered_devices(),
            vec![ObjectPath::new("/org/bluez/hci0/dev_AA")]
        );
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = ContextConfig::default();
        config.bus.queue_capacity = 0;
        let transport = Arc::new(MemoryTransport::new()) as Arc<dyn Transport>;
        assert!(BleContext::new(transport, config).is_err());
    }
}
