//! Object tree data model and transport adapter interface
//!
//! The rest of the SDK never talks to the remote service directly. It sees
//! an [`ObjectTree`] of [`ObjectPath`] → interface → property bag, a stream
//! of [`Signal`]s, and the calls on the [`Transport`] trait. A concrete
//! adapter (D-Bus or otherwise) implements the trait; tests use
//! `MemoryTransport` from the `test-support` feature.

pub mod error;
pub mod path;
pub mod signal;
pub mod transport;
pub mod value;

#[cfg(any(test, feature = "test-support"))]
pub mod memory;

pub use error::{Result, TransportError};
pub use path::ObjectPath;
pub use signal::{Signal, SignalScope, INTERFACES_ADDED, INTERFACES_REMOVED, PROPERTIES_CHANGED};
pub use transport::{SignalReceiver, Transport};
pub use value::{bag, InterfaceMap, ObjectTree, PropertyBag, Value};

#[cfg(any(test, feature = "test-support"))]
pub use memory::{InvokedCall, MemoryTransport};
