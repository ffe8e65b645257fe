//! Change synchronizer
//!
//! Owns one transport signal channel and applies its signals, strictly in
//! arrival order, to the object cache, then publishes the domain events that
//! follow from each change.
//!
//! ```text
//! ChangeSynchronizer ──start()──► RunningSynchronizer ──stop()──► (done)
//!    Unregistered                 Registered → Draining → Unregistered
//! ```
//!
//! `start` consumes the unstarted synchronizer, so starting twice does not
//! compile.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use ble_transport::{ObjectPath, PropertyBag, Signal, SignalReceiver, SignalScope, Transport};
use crossbeam::channel::RecvTimeoutError;
use parking_lot::{Mutex, RwLock};

use crate::cache::ObjectCache;
use crate::config::SyncConfig;
use crate::error::{Result, StateError};
use crate::events::DomainBus;
use crate::property::Device1Properties;
use crate::publisher::DomainPublisher;
use crate::signal::{decode, LifecycleSignal};

/// What a synchronizer listens to
pub type SyncScope = SignalScope;

/// Registration state of a synchronizer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SyncState {
    Unregistered = 0,
    Registered = 1,
    Draining = 2,
}

impl SyncState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => SyncState::Registered,
            2 => SyncState::Draining,
            _ => SyncState::Unregistered,
        }
    }
}

/// A synchronizer that has not been started
pub struct ChangeSynchronizer {
    transport: Arc<dyn Transport>,
    cache: ObjectCache,
    bus: DomainBus,
    scope: SyncScope,
    config: SyncConfig,
    device_snapshot: Option<DeviceSnapshot>,
}

/// Device properties kept current by an object-scoped synchronizer
pub type DeviceSnapshot = Arc<RwLock<Device1Properties>>;

impl ChangeSynchronizer {
    pub fn new(
        transport: Arc<dyn Transport>,
        cache: ObjectCache,
        bus: DomainBus,
        scope: SyncScope,
        config: SyncConfig,
    ) -> Self {
        Self {
            transport,
            cache,
            bus,
            scope,
            config,
            device_snapshot: None,
        }
    }

    /// Keep `snapshot` up to date with every device property change seen
    /// for the scoped object, before the change is published
    ///
    /// Uncached devices start their change events from this snapshot.
    pub fn with_device_snapshot(mut self, snapshot: DeviceSnapshot) -> Self {
        self.device_snapshot = Some(snapshot);
        self
    }

    pub fn scope(&self) -> &SyncScope {
        &self.scope
    }

    pub fn state(&self) -> SyncState {
        SyncState::Unregistered
    }

    /// Register with the transport and start the signal loop
    ///
    /// A tree-scoped synchronizer registers first and then seeds the cache
    /// with a full load, so no signal between the two is lost. Any failure
    /// undoes the registration and is returned.
    pub fn start(self) -> Result<RunningSynchronizer> {
        self.config.validate()?;

        let rx = self.transport.open_signal_channel(&self.scope)?;
        tracing::debug!("Registered signal channel for {}", self.scope);

        if self.scope == SyncScope::Tree {
            if let Err(e) = self.cache.load() {
                self.close_channel();
                return Err(e);
            }
        }

        let shared = Arc::new(SyncShared {
            publisher: DomainPublisher::new(self.bus, self.config.interfaces.clone()),
            transport: self.transport,
            cache: self.cache,
            scope: self.scope,
            device_snapshot: self.device_snapshot,
            state: AtomicU8::new(SyncState::Registered as u8),
            cancelled: AtomicBool::new(false),
        });

        let thread_name = match &shared.scope {
            SyncScope::Tree => "ble-sync-tree".to_string(),
            SyncScope::Object(path) => format!("ble-sync-{}", path.last_segment().unwrap_or("object")),
        };
        let worker = Arc::clone(&shared);
        let poll_interval = self.config.poll_interval;
        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || run_signal_loop(worker, rx, poll_interval));

        let handle = match handle {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!("Failed to spawn {}: {}", thread_name, e);
                shared.close_channel();
                shared.set_state(SyncState::Unregistered);
                return Err(StateError::Spawn(thread_name));
            }
        };

        tracing::info!("Change synchronizer started for {}", shared.scope);
        Ok(RunningSynchronizer {
            shared,
            handle: Mutex::new(Some(handle)),
        })
    }

    fn close_channel(&self) {
        if let Err(e) = self.transport.close_signal_channel(&self.scope) {
            tracing::warn!("Failed to close signal channel for {}: {}", self.scope, e);
        }
    }
}

struct SyncShared {
    transport: Arc<dyn Transport>,
    cache: ObjectCache,
    publisher: DomainPublisher,
    scope: SyncScope,
    device_snapshot: Option<DeviceSnapshot>,
    state: AtomicU8,
    cancelled: AtomicBool,
}

impl SyncShared {
    fn set_state(&self, state: SyncState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    fn close_channel(&self) {
        if let Err(e) = self.transport.close_signal_channel(&self.scope) {
            tracing::warn!("Failed to close signal channel for {}: {}", self.scope, e);
        }
    }

    /// Apply one signal; malformed signals are logged and dropped
    fn process(&self, signal: &Signal) {
        let decoded = match decode(signal) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::warn!("Skipping signal from {}: {}", signal.path, e);
                return;
            }
        };

        match decoded {
            LifecycleSignal::InterfacesAdded { path, interfaces } => {
                tracing::debug!("Interfaces added on {}: {:?}", path, interfaces.keys());
                self.cache.apply_added(&path, interfaces.clone());
                self.publisher.added(&path, &interfaces);
            }
            LifecycleSignal::InterfacesRemoved { path, interfaces } => {
                tracing::debug!("Interfaces removed on {}: {:?}", path, interfaces);
                let last_known = self
                    .cache
                    .apply_interfaces_removed(&path, &interfaces)
                    .unwrap_or_default();
                self.publisher.removed(&path, &interfaces, &last_known);
            }
            LifecycleSignal::PropertiesChanged {
                path,
                interface,
                changed,
                invalidated,
            } => {
                let merged = self
                    .cache
                    .apply_properties_changed(&path, &interface, &changed, &invalidated);
                if merged.is_none() {
                    tracing::debug!("Properties changed on uncached object {}", path);
                }
                let base = (interface == self.publisher.interfaces().device)
                    .then(|| self.device_base(&path, &changed, merged.as_ref()));
                self.publisher.changed(&path, &interface, &changed, base);
            }
        }
    }

    /// Starting point for a device change event: the cached entry, else the
    /// device snapshot when this is the device's watcher
    ///
    /// The watcher also records the properties after `changed` in the
    /// snapshot.
    fn device_base(&self, path: &ObjectPath, changed: &PropertyBag, merged: Option<&PropertyBag>) -> Device1Properties {
        let snapshot = match (&self.scope, &self.device_snapshot) {
            (SyncScope::Object(scoped), Some(snapshot)) if scoped == path => Some(snapshot),
            _ => None,
        };
        let base = match (merged, snapshot) {
            (Some(bag), _) => Device1Properties::from_bag(bag),
            (None, Some(snapshot)) => snapshot.read().clone(),
            (None, None) => Device1Properties::default(),
        };

        if let Some(snapshot) = snapshot {
            let mut latest = base.clone();
            for (field, value) in changed {
                latest.apply(field, value);
            }
            *snapshot.write() = latest;
        }
        base
    }
}

fn run_signal_loop(shared: Arc<SyncShared>, rx: SignalReceiver, poll_interval: Duration) {
    tracing::debug!("Signal loop for {} started", shared.scope);

    while !shared.cancelled.load(Ordering::SeqCst) {
        match rx.recv_timeout(poll_interval) {
            Ok(signal) => {
                if shared.cancelled.load(Ordering::SeqCst) {
                    break;
                }
                shared.process(&signal);
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                tracing::info!("Signal channel for {} closed by transport", shared.scope);
                if !shared.cancelled.load(Ordering::SeqCst) {
                    shared.set_state(SyncState::Unregistered);
                }
                break;
            }
        }
    }

    tracing::debug!("Signal loop for {} stopped", shared.scope);
}

/// A started synchronizer
///
/// Dropping it stops the loop.
pub struct RunningSynchronizer {
    shared: Arc<SyncShared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for RunningSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningSynchronizer")
            .field("scope", &self.shared.scope)
            .field("state", &self.state())
            .finish()
    }
}

impl RunningSynchronizer {
    pub fn scope(&self) -> &SyncScope {
        &self.shared.scope
    }

    pub fn state(&self) -> SyncState {
        SyncState::from_u8(self.shared.state.load(Ordering::SeqCst))
    }

    /// True until `stop()` or until the transport closed the channel
    pub fn is_running(&self) -> bool {
        self.state() == SyncState::Registered
    }

    /// Stop reading signals and unregister from the transport
    ///
    /// Idempotent. May be called from any thread, including from a bus
    /// handler running while the loop publishes; the loop thread is only
    /// joined when the caller is not the loop itself.
    pub fn stop(&self) {
        if self.shared.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.set_state(SyncState::Draining);
        self.shared.close_channel();

        if let Some(handle) = self.handle.lock().take() {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                tracing::error!("Signal loop for {} panicked", self.shared.scope);
            }
        }

        self.shared.set_state(SyncState::Unregistered);
        tracing::info!("Change synchronizer stopped for {}", self.shared.scope);
    }

    /// Reload the cache and publish "added" events for every cached
    /// object, in path order
    ///
    /// Signals that arrive while the tree is being fetched are applied on
    /// top of it once it is in place.
    pub fn refresh_state(&self) -> Result<()> {
        let tree = self.shared.cache.load()?;
        self.shared.publisher.republish(&tree);
        Ok(())
    }

    /// Apply a signal on the caller's thread, as if it came from the channel
    pub fn inject(&self, signal: &Signal) {
        self.shared.process(signal);
    }
}

impl Drop for RunningSynchronizer {
    fn drop(&mut self) {
        self.stop();
    }
}
