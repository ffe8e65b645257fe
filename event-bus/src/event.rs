//! Events delivered by the bus
//!
//! An `Event` pairs the topic it was published on with an arbitrary payload.
//! The bus wraps every event in an `Arc` so all handlers of one publish share
//! the same allocation.

use std::time::Instant;

/// A published event
///
/// # Example
///
/// ```rust
/// use event_bus::Event;
///
/// let event = Event::new("discovery", 42u32);
/// assert_eq!(event.topic(), "discovery");
/// assert_eq!(*event.payload(), 42);
/// ```
#[derive(Debug, Clone)]
pub struct Event<P> {
    /// Topic the event was published on
    pub topic: String,
    /// Event payload
    pub payload: P,
    /// When `publish` was called
    pub published_at: Instant,
}

impl<P> Event<P> {
    /// Create a new event stamped with the current instant
    pub fn new(topic: impl Into<String>, payload: P) -> Self {
        Self {
            topic: topic.into(),
            payload,
            published_at: Instant::now(),
        }
    }

    /// Topic the event was published on
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Event payload
    pub fn payload(&self) -> &P {
        &self.payload
    }
}
