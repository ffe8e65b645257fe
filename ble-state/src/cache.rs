//! Object cache
//!
//! A local copy of the remote object tree. Readers get an `Arc` snapshot
//! and never see a half-applied change; writers copy-on-write when a
//! snapshot is still held, otherwise they mutate in place.
//!
//! A full load holds the writer lock from fetch to swap, so a signal
//! applied while the fetch is in flight lands on the fetched tree instead
//! of being overwritten by it.

use std::sync::Arc;

use ble_transport::{InterfaceMap, ObjectPath, ObjectTree, PropertyBag, Transport};
use parking_lot::{Mutex, RwLock};

use crate::error::Result;

/// Shared, cheaply cloneable cache of the remote object tree
#[derive(Clone)]
pub struct ObjectCache {
    tree: Arc<RwLock<Arc<ObjectTree>>>,
    writer: Arc<Mutex<()>>,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for ObjectCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectCache")
            .field("objects", &self.len())
            .finish()
    }
}

impl ObjectCache {
    /// Create an empty cache backed by `transport`
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            tree: Arc::new(RwLock::new(Arc::new(ObjectTree::new()))),
            writer: Arc::new(Mutex::new(())),
            transport,
        }
    }

    /// Replace the cache with a full fetch of the remote tree
    ///
    /// On error the cache is left untouched and the transport error is
    /// returned as is. Mutations from other threads wait until the fetched
    /// tree is in place.
    pub fn load(&self) -> Result<Arc<ObjectTree>> {
        let _writer = self.writer.lock();
        let fetched = Arc::new(self.transport.fetch_object_tree()?);
        *self.tree.write() = Arc::clone(&fetched);
        tracing::debug!("Loaded {} objects", fetched.len());
        Ok(fetched)
    }

    /// Snapshot of the current tree
    pub fn get(&self) -> Arc<ObjectTree> {
        Arc::clone(&self.tree.read())
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut ObjectTree) -> R) -> R {
        let _writer = self.writer.lock();
        let mut guard = self.tree.write();
        f(Arc::make_mut(&mut guard))
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Record interfaces added to `path`
    ///
    /// Each interface in `interfaces` replaces the same-named interface of an
    /// existing entry; interfaces not mentioned are kept.
    pub fn apply_added(&self, path: &ObjectPath, interfaces: InterfaceMap) {
        self.mutate(|tree| {
            let entry = tree.entry(path.clone()).or_default();
            entry.extend(interfaces);
        });
    }

    /// Drop the whole entry for `path`, returning what it held
    pub fn apply_removed(&self, path: &ObjectPath) -> Option<InterfaceMap> {
        self.mutate(|tree| tree.remove(path))
    }

    /// Drop the listed interfaces of `path`, and the entry itself once it
    /// has none left. Returns the removed interfaces with their last known
    /// properties.
    pub fn apply_interfaces_removed<S: AsRef<str>>(
        &self,
        path: &ObjectPath,
        interfaces: &[S],
    ) -> Option<InterfaceMap> {
        self.mutate(|tree| {
            let entry = tree.get_mut(path)?;
            let removed: InterfaceMap = interfaces
                .iter()
                .filter_map(|iface| entry.remove_entry(iface.as_ref()))
                .collect();
            if entry.is_empty() {
                tree.remove(path);
            }
            Some(removed)
        })
    }

    /// Merge changed properties into the cached bag of `interface`
    ///
    /// Invalidated properties are dropped from the bag. Returns the merged
    /// bag, or `None` if the object is not cached.
    pub fn apply_properties_changed<S: AsRef<str>>(
        &self,
        path: &ObjectPath,
        interface: &str,
        changed: &PropertyBag,
        invalidated: &[S],
    ) -> Option<PropertyBag> {
        self.mutate(|tree| {
            let bag = tree.get_mut(path)?.entry(interface.to_string()).or_default();
            for (name, value) in changed {
                bag.insert(name.clone(), value.clone());
            }
            for name in invalidated {
                bag.remove(name.as_ref());
            }
            Some(bag.clone())
        })
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn contains(&self, path: &ObjectPath) -> bool {
        self.tree.read().contains_key(path)
    }

    /// Everything cached for `path`
    pub fn interfaces(&self, path: &ObjectPath) -> Option<InterfaceMap> {
        self.tree.read().get(path).cloned()
    }

    /// Cached properties of one interface of `path`
    pub fn properties(&self, path: &ObjectPath, interface: &str) -> Option<PropertyBag> {
        self.tree
            .read()
            .get(path)
            .and_then(|ifaces| ifaces.get(interface))
            .cloned()
    }

    /// Paths exposing `interface`, in path order
    pub fn paths_with_interface(&self, interface: &str) -> Vec<ObjectPath> {
        self.tree
            .read()
            .iter()
            .filter(|(_, ifaces)| ifaces.contains_key(interface))
            .map(|(path, _)| path.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tree.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ble_transport::{bag, MemoryTransport, TransportError, Value};

    const DEVICE: &str = "/org/bluez/hci0/dev_AA";
    const DEVICE1: &str = "org.bluez.Device1";

    fn ifaces(entries: &[(&str, PropertyBag)]) -> InterfaceMap {
        entries
            .iter()
            .map(|(name, props)| (name.to_string(), props.clone()))
            .collect()
    }

    fn empty_cache() -> (Arc<MemoryTransport>, ObjectCache) {
        let transport = Arc::new(MemoryTransport::new());
        let cache = ObjectCache::new(transport.clone());
        (transport, cache)
    }

    #[test]
    fn test_load_replaces_wholesale() {
        let (transport, cache) = empty_cache();
        cache.apply_added(&ObjectPath::new("/stale"), InterfaceMap::new());
        transport.insert_object(DEVICE, ifaces(&[(DEVICE1, bag([("Connected", false)]))]));

        let loaded = cache.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(cache.contains(&ObjectPath::new(DEVICE)));
        assert!(!cache.contains(&ObjectPath::new("/stale")));
    }

    #[test]
    fn test_load_error_leaves_cache_untouched() {
        let (transport, cache) = empty_cache();
        cache.apply_added(&ObjectPath::new("/kept"), InterfaceMap::new());
        transport.set_tree_fetch_error(Some(TransportError::Disconnected("bus gone".into())));

        assert!(cache.load().is_err());
        assert!(cache.contains(&ObjectPath::new("/kept")));
    }

    #[test]
    fn test_snapshot_is_stable_across_writes() {
        let (_, cache) = empty_cache();
        let before = cache.get();
        cache.apply_added(&ObjectPath::new(DEVICE), ifaces(&[(DEVICE1, PropertyBag::new())]));
        assert!(before.is_empty());
        assert_eq!(cache.get().len(), 1);
    }

    #[test]
    fn test_apply_added_merges_interfaces() {
        let (_, cache) = empty_cache();
        let path = ObjectPath::new(DEVICE);
        cache.apply_added(&path, ifaces(&[(DEVICE1, bag([("Connected", false)]))]));
        cache.apply_added(&path, ifaces(&[("org.bluez.Battery1", bag([("Percentage", 80u8)]))]));

        let cached = cache.interfaces(&path).unwrap();
        assert_eq!(cached.len(), 2);
    }

    #[test]
    fn test_apply_removed_is_noop_when_absent() {
        let (_, cache) = empty_cache();
        assert!(cache.apply_removed(&ObjectPath::new("/missing")).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_interfaces_removed_deletes_empty_entry() {
        let (_, cache) = empty_cache();
        let path = ObjectPath::new(DEVICE);
        cache.apply_added(
            &path,
            ifaces(&[(DEVICE1, bag([("Connected", true)])), ("org.bluez.Battery1", PropertyBag::new())]),
        );

        let removed = cache.apply_interfaces_removed(&path, &["org.bluez.Battery1"]).unwrap();
        assert!(removed.contains_key("org.bluez.Battery1"));
        assert!(cache.contains(&path));

        let removed = cache.apply_interfaces_removed(&path, &[DEVICE1]).unwrap();
        assert_eq!(removed[DEVICE1]["Connected"], Value::Bool(true));
        assert!(!cache.contains(&path));
    }

    #[test]
    fn test_properties_changed_merges_and_invalidates() {
        let (_, cache) = empty_cache();
        let path = ObjectPath::new(DEVICE);
        cache.apply_added(&path, ifaces(&[(DEVICE1, bag([("Connected", false), ("Paired", true)]))]));

        let merged = cache
            .apply_properties_changed(&path, DEVICE1, &bag([("Connected", true)]), &["Paired"])
            .unwrap();
        assert_eq!(merged.get("Connected"), Some(&Value::Bool(true)));
        assert!(!merged.contains_key("Paired"));
        assert_eq!(cache.properties(&path, DEVICE1), Some(merged));

        let unknown = cache.apply_properties_changed(&ObjectPath::new("/nope"), DEVICE1, &PropertyBag::new(), &[] as &[&str]);
        assert!(unknown.is_none());
    }

    #[test]
    fn test_paths_with_interface() {
        let (_, cache) = empty_cache();
        cache.apply_added(&ObjectPath::new("/b"), ifaces(&[(DEVICE1, PropertyBag::new())]));
        cache.apply_added(&ObjectPath::new("/a"), ifaces(&[(DEVICE1, PropertyBag::new())]));
        cache.apply_added(&ObjectPath::new("/c"), ifaces(&[("org.bluez.Adapter1", PropertyBag::new())]));

        assert_eq!(
            cache.paths_with_interface(DEVICE1),
            vec![ObjectPath::new("/a"), ObjectPath::new("/b")]
        );
    }
}
