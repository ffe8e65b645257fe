//! Object tree cache and change synchronization
//!
//! Keeps a local copy of a remote object tree current by consuming the
//! transport's lifecycle and property signals, and republishes each change
//! as typed domain events on an [`event_bus::EventBus`].
//!
//! # Architecture
//!
//! ```text
//! Transport ──signals──► ChangeSynchronizer ──► ObjectCache (Arc snapshot)
//!                               │
//!                               └──► DomainPublisher ──► DomainBus
//!                                        "discovery", "adapter",
//!                                        "service", "char", "desc",
//!                                        "<dev>.service", "<path>.changed", ...
//! ```
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use ble_state::{ChangeSynchronizer, DomainBus, ObjectCache, SyncConfig, SyncScope};
//!
//! let cache = ObjectCache::new(transport.clone());
//! let bus = DomainBus::new();
//! let discovery = bus.iter("discovery");
//!
//! let sync = ChangeSynchronizer::new(transport, cache.clone(), bus, SyncScope::Tree, SyncConfig::default())
//!     .start()?;
//!
//! for event in discovery.timeout_iter(std::time::Duration::from_secs(5)) {
//!     println!("{:?}", event.payload());
//! }
//! sync.stop();
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod path;
pub mod property;
pub mod publisher;
pub mod signal;
pub mod synchronizer;

pub use cache::ObjectCache;
pub use config::{bluez, InterfaceNames, SyncConfig};
pub use error::{Result, StateError};
pub use events::{
    topics, AdapterEvent, DiscoveredDeviceEvent, DomainBus, DomainEvent, EventStatus,
    GattCharacteristicEvent, GattDescriptorEvent, GattServiceEvent, PropertyChangedEvent,
};
pub use path::EntityKind;
pub use property::{
    Device1Properties, FieldUpdate, FromValue, GattCharacteristic1Properties,
    GattDescriptor1Properties, GattService1Properties,
};
pub use publisher::DomainPublisher;
pub use synchronizer::{ChangeSynchronizer, DeviceSnapshot, RunningSynchronizer, SyncScope, SyncState};

/// Commonly used types
pub mod prelude {
    pub use crate::{
        ChangeSynchronizer, DomainBus, DomainEvent, EventStatus, ObjectCache, RunningSynchronizer,
        SyncConfig, SyncScope,
    };
}
