//! Transport adapter interface
//!
//! The core calls into a `Transport` for everything that crosses the process
//! boundary. Implementations are expected to bound every call with their own
//! timeout and to handle reconnection themselves.

use crossbeam::channel::Receiver;

use crate::error::Result;
use crate::path::ObjectPath;
use crate::signal::{Signal, SignalScope};
use crate::value::{ObjectTree, PropertyBag, Value};

/// Receiving end of a signal channel
pub type SignalReceiver = Receiver<Signal>;

/// Remote object/property service as seen by the core
pub trait Transport: Send + Sync {
    /// Fetch the entire object tree in one call
    fn fetch_object_tree(&self) -> Result<ObjectTree>;

    /// Start receiving signals for `scope`
    ///
    /// The channel disconnects when the adapter stops sending, either
    /// because `close_signal_channel` was called or the connection dropped.
    fn open_signal_channel(&self, scope: &SignalScope) -> Result<SignalReceiver>;

    /// Stop delivering signals for `scope`
    fn close_signal_channel(&self, scope: &SignalScope) -> Result<()>;

    /// Fetch all properties of `interface` on `path`
    fn fetch_properties(&self, path: &ObjectPath, interface: &str) -> Result<PropertyBag>;

    /// Fetch one property; `Ok(None)` if the object does not expose it
    fn fetch_property(&self, path: &ObjectPath, interface: &str, name: &str) -> Result<Option<Value>>;

    /// Invoke a method and return its output arguments
    fn invoke(&self, path: &ObjectPath, interface: &str, method: &str, args: &[Value]) -> Result<Vec<Value>>;
}
