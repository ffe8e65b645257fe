//! In-memory transport
//!
//! Holds an object tree in process and lets tests drive it: mutate the
//! tree and emit the matching signal, inject failures, and inspect the
//! method calls the core made.

use std::collections::HashMap;

use crossbeam::channel::{self, Sender};
use parking_lot::Mutex;

use crate::error::{Result, TransportError};
use crate::path::ObjectPath;
use crate::signal::{Signal, SignalScope};
use crate::transport::{SignalReceiver, Transport};
use crate::value::{InterfaceMap, ObjectTree, PropertyBag, Value};

/// A method call recorded by `MemoryTransport::invoke`
#[derive(Debug, Clone, PartialEq)]
pub struct InvokedCall {
    pub path: ObjectPath,
    pub interface: String,
    pub method: String,
    pub args: Vec<Value>,
}

#[derive(Default)]
struct MemoryState {
    tree: ObjectTree,
    channels: HashMap<SignalScope, Sender<Signal>>,
    calls: Vec<InvokedCall>,
    responses: HashMap<(String, String), Vec<Value>>,
    method_errors: HashMap<String, TransportError>,
    tree_fetch_error: Option<TransportError>,
    open_error: Option<TransportError>,
    tree_fetches: usize,
}

/// Transport backed by an in-process object tree
#[derive(Default)]
pub struct MemoryTransport {
    state: Mutex<MemoryState>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing tree
    pub fn with_tree(tree: ObjectTree) -> Self {
        let transport = Self::new();
        transport.state.lock().tree = tree;
        transport
    }

    // ========================================================================
    // Remote state
    // ========================================================================

    /// Current remote tree
    pub fn tree(&self) -> ObjectTree {
        self.state.lock().tree.clone()
    }

    /// Place an object in the remote tree without emitting anything
    pub fn insert_object(&self, path: impl Into<ObjectPath>, interfaces: InterfaceMap) {
        self.state.lock().tree.insert(path.into(), interfaces);
    }

    /// Add interfaces to an object and emit `InterfacesAdded`
    ///
    /// Returns whether a tree listener received the signal.
    pub fn add_interfaces(&self, path: impl Into<ObjectPath>, interfaces: InterfaceMap) -> bool {
        let path = path.into();
        let mut state = self.state.lock();
        let entry = state.tree.entry(path.clone()).or_default();
        for (iface, props) in &interfaces {
            entry.insert(iface.clone(), props.clone());
        }
        Self::deliver(&mut state, &SignalScope::Tree, Signal::interfaces_added(path, interfaces))
    }

    /// Remove interfaces from an object and emit `InterfacesRemoved`
    pub fn remove_interfaces<S: AsRef<str>>(&self, path: impl Into<ObjectPath>, interfaces: &[S]) -> bool {
        let path = path.into();
        let mut state = self.state.lock();
        if let Some(entry) = state.tree.get_mut(&path) {
            for iface in interfaces {
                entry.remove(iface.as_ref());
            }
            if entry.is_empty() {
                state.tree.remove(&path);
            }
        }
        Self::deliver(&mut state, &SignalScope::Tree, Signal::interfaces_removed(path, interfaces))
    }

    /// Remove an object entirely, emitting `InterfacesRemoved` for all of
    /// its interfaces
    pub fn remove_object(&self, path: impl Into<ObjectPath>) -> bool {
        let path = path.into();
        let mut state = self.state.lock();
        let Some(entry) = state.tree.remove(&path) else {
            return false;
        };
        let mut interfaces: Vec<String> = entry.into_keys().collect();
        interfaces.sort();
        Self::deliver(&mut state, &SignalScope::Tree, Signal::interfaces_removed(path, &interfaces))
    }

    /// Merge changed properties and emit `PropertiesChanged` to the
    /// object's own channel
    pub fn set_properties(&self, path: impl Into<ObjectPath>, interface: &str, changed: PropertyBag) -> bool {
        let path = path.into();
        let mut state = self.state.lock();
        if let Some(bag) = state
            .tree
            .get_mut(&path)
            .and_then(|entry| entry.get_mut(interface))
        {
            for (name, value) in &changed {
                bag.insert(name.clone(), value.clone());
            }
        }
        let scope = SignalScope::Object(path.clone());
        Self::deliver(&mut state, &scope, Signal::properties_changed(path, interface, changed))
    }

    /// Send an arbitrary signal on `scope`
    pub fn emit(&self, scope: &SignalScope, signal: Signal) -> bool {
        Self::deliver(&mut self.state.lock(), scope, signal)
    }

    fn deliver(state: &mut MemoryState, scope: &SignalScope, signal: Signal) -> bool {
        let Some(sender) = state.channels.get(scope) else {
            return false;
        };
        if sender.send(signal).is_err() {
            state.channels.remove(scope);
            return false;
        }
        true
    }

    // ========================================================================
    // Failure injection and responses
    // ========================================================================

    /// Make `fetch_object_tree` fail until cleared with `None`
    pub fn set_tree_fetch_error(&self, error: Option<TransportError>) {
        self.state.lock().tree_fetch_error = error;
    }

    /// Make `open_signal_channel` fail until cleared with `None`
    pub fn set_open_error(&self, error: Option<TransportError>) {
        self.state.lock().open_error = error;
    }

    /// Make every call to `method` fail
    pub fn fail_method(&self, method: &str, error: TransportError) {
        self.state.lock().method_errors.insert(method.to_string(), error);
    }

    /// Output arguments returned by `interface.method`
    pub fn respond(&self, interface: &str, method: &str, output: Vec<Value>) {
        self.state
            .lock()
            .responses
            .insert((interface.to_string(), method.to_string()), output);
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// Every method call made so far, oldest first
    pub fn calls(&self) -> Vec<InvokedCall> {
        self.state.lock().calls.clone()
    }

    /// Number of calls to `method` on `path`
    pub fn call_count(&self, path: &ObjectPath, method: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| &c.path == path && c.method == method)
            .count()
    }

    pub fn is_channel_open(&self, scope: &SignalScope) -> bool {
        self.state.lock().channels.contains_key(scope)
    }

    /// Number of successful `fetch_object_tree` calls
    pub fn tree_fetches(&self) -> usize {
        self.state.lock().tree_fetches
    }
}

fn unknown_object(path: &ObjectPath, method: &str) -> TransportError {
    TransportError::call(path.as_str(), method, "unknown object")
}

impl Transport for MemoryTransport {
    fn fetch_object_tree(&self) -> Result<ObjectTree> {
        let mut state = self.state.lock();
        if let Some(err) = &state.tree_fetch_error {
            return Err(err.clone());
        }
        state.tree_fetches += 1;
        Ok(state.tree.clone())
    }

    fn open_signal_channel(&self, scope: &SignalScope) -> Result<SignalReceiver> {
        let mut state = self.state.lock();
        if let Some(err) = &state.open_error {
            return Err(err.clone());
        }
        let (tx, rx) = channel::unbounded();
        state.channels.insert(scope.clone(), tx);
        tracing::debug!("Opened signal channel for {}", scope);
        Ok(rx)
    }

    fn close_signal_channel(&self, scope: &SignalScope) -> Result<()> {
        if self.state.lock().channels.remove(scope).is_some() {
            tracing::debug!("Closed signal channel for {}", scope);
        }
        Ok(())
    }

    fn fetch_properties(&self, path: &ObjectPath, interface: &str) -> Result<PropertyBag> {
        let state = self.state.lock();
        let entry = state
            .tree
            .get(path)
            .ok_or_else(|| unknown_object(path, "GetAll"))?;
        entry
            .get(interface)
            .cloned()
            .ok_or_else(|| TransportError::call(path.as_str(), "GetAll", format!("no interface {}", interface)))
    }

    fn fetch_property(&self, path: &ObjectPath, interface: &str, name: &str) -> Result<Option<Value>> {
        let state = self.state.lock();
        let entry = state
            .tree
            .get(path)
            .ok_or_else(|| unknown_object(path, "Get"))?;
        Ok(entry.get(interface).and_then(|bag| bag.get(name)).cloned())
    }

    fn invoke(&self, path: &ObjectPath, interface: &str, method: &str, args: &[Value]) -> Result<Vec<Value>> {
        let mut state = self.state.lock();
        state.calls.push(InvokedCall {
            path: path.clone(),
            interface: interface.to_string(),
            method: method.to_string(),
            args: args.to_vec(),
        });
        if let Some(err) = state.method_errors.get(method) {
            return Err(err.clone());
        }
        Ok(state
            .responses
            .get(&(interface.to_string(), method.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}
