//! Memoization of device facades by object path

use std::sync::{Arc, Weak};

use ble_transport::ObjectPath;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::device::Device;
use crate::error::Result;

type DeviceMap = DashMap<ObjectPath, Arc<Device>>;

/// One `Device` per path, for as long as it is registered
#[derive(Clone, Default)]
pub(crate) struct DeviceRegistry {
    devices: Arc<DeviceMap>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered device for `path`, or a new one from `build`
    ///
    /// The entry stays locked from lookup to insert, so concurrent callers
    /// for the same path all get the same instance. A failed `build`
    /// registers nothing. `build` must not touch the registry.
    pub fn resolve<F>(&self, path: &ObjectPath, build: F) -> Result<Arc<Device>>
    where
        F: FnOnce(RegistryHandle) -> Result<Device>,
    {
        match self.devices.entry(path.clone()) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let device = Arc::new(build(self.handle())?);
                entry.insert(Arc::clone(&device));
                tracing::debug!("Registered device {}", path);
                Ok(device)
            }
        }
    }

    pub fn get(&self, path: &ObjectPath) -> Option<Arc<Device>> {
        self.devices.get(path).map(|entry| Arc::clone(entry.value()))
    }

    /// Registered devices in path order
    pub fn all(&self) -> Vec<Arc<Device>> {
        let mut devices: Vec<Arc<Device>> = self
            .devices
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        devices.sort_by(|a, b| a.path().cmp(b.path()));
        devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    fn handle(&self) -> RegistryHandle {
        RegistryHandle(Arc::downgrade(&self.devices))
    }
}

/// Weak back-reference a device uses to unregister itself
#[derive(Clone, Default)]
pub(crate) struct RegistryHandle(Weak<DeviceMap>);

impl RegistryHandle {
    /// Handle for devices that are never registered
    pub fn detached() -> Self {
        Self::default()
    }

    /// Removes `device` if it is the instance registered under its path
    pub fn remove(&self, device: &Device) -> bool {
        let Some(devices) = self.0.upgrade() else {
            return false;
        };
        let removed = devices
            .remove_if(device.path(), |_, registered| {
                std::ptr::eq(Arc::as_ptr(registered), device)
            })
            .is_some();
        if removed {
            tracing::debug!("Unregistered device {}", device.path());
        }
        removed
    }
}
