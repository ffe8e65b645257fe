//! Topic-based publish/subscribe bus
//!
//! Publishers hand an event to the bus and return immediately; every callback
//! registered on the event's topic is invoked later, concurrently, and in
//! isolation from the others. A failing or panicking handler is counted and
//! logged but never reaches the publisher or other handlers.
//!
//! # Features
//!
//! - **Lazy dispatch**: the dispatch loop exists only while the bus has
//!   subscribers, and is torn down when the last one leaves
//! - **Wildcard unsubscription**: `unsubscribe_all("device123.*")` removes
//!   every listener in a namespace
//! - **Blocking iteration**: consume a topic through `EventBus::iter`
//!
//! # Quick Start
//!
//! ```rust
//! use event_bus::{Callback, EventBus};
//! use std::time::Duration;
//!
//! let bus: EventBus<String> = EventBus::new();
//! let discovery = bus.iter("discovery");
//!
//! bus.publish("discovery", "/org/bluez/hci0/dev_AA".to_string());
//!
//! let event = discovery.recv_timeout(Duration::from_secs(1)).unwrap();
//! assert_eq!(event.payload(), "/org/bluez/hci0/dev_AA");
//! ```
//!
//! # Architecture
//!
//! ```text
//! EventBus<P>
//!     │
//!     ├── topics: HashMap<topic, Vec<Callback<P>>>
//!     │
//!     └── dispatcher (while subscribed)
//!             │
//!             ├── crossbeam bounded queue  ◄── publish()
//!             │
//!             └── dispatch thread ──► tokio blocking pool ──► callbacks
//! ```

pub mod bus;
pub mod callback;
pub mod config;
mod dispatcher;
pub mod error;
pub mod event;
pub mod iter;
pub mod pattern;
mod stats;

pub use bus::{EventBus, Subscription};
pub use callback::{Callback, CallbackId, HandlerError, HandlerResult};
pub use config::BusConfig;
pub use error::{BusError, Result};
pub use event::Event;
pub use iter::{EventIterator, TimeoutIter, TryIter};
pub use pattern::TopicPattern;
pub use stats::StatsSnapshot;

/// Commonly used types
pub mod prelude {
    pub use crate::{BusConfig, Callback, Event, EventBus, EventIterator, Subscription};
}
