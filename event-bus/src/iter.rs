//! Blocking iterator over a topic
//!
//! Provides various iteration patterns for consuming events:
//! - Blocking: `recv()`, `for event in iter`
//! - Non-blocking: `try_recv()`, `try_iter()`
//! - Timeout: `recv_timeout()`, `timeout_iter()`

use std::sync::{Arc, Weak};
use std::time::Duration;

use crossbeam::channel::Receiver;

use crate::bus::{BusInner, EventBus, Subscription};
use crate::event::Event;

/// Blocking iterator over events published on one topic
///
/// Created by [`EventBus::iter`]. Dropping the iterator removes its
/// subscription, which may return the bus to its dormant state.
///
/// # Example
///
/// ```rust
/// use event_bus::EventBus;
/// use std::time::Duration;
///
/// let bus: EventBus<&'static str> = EventBus::new();
/// let events = bus.iter("adapter");
/// bus.publish("adapter", "hci0");
///
/// let event = events.recv_timeout(Duration::from_secs(1)).unwrap();
/// assert_eq!(*event.payload(), "hci0");
/// ```
pub struct EventIterator<P: Send + Sync + 'static> {
    rx: Receiver<Event<P>>,
    bus: Weak<BusInner<P>>,
    subscription: Subscription,
}

impl<P: Send + Sync + 'static> EventIterator<P> {
    pub(crate) fn new(
        rx: Receiver<Event<P>>,
        bus: Weak<BusInner<P>>,
        subscription: Subscription,
    ) -> Self {
        Self {
            rx,
            bus,
            subscription,
        }
    }

    /// Topic this iterator is subscribed to
    pub fn topic(&self) -> &str {
        self.subscription.topic()
    }

    /// Block until the next event is available
    ///
    /// Returns `None` if the subscription is gone (for example after an
    /// `unsubscribe_all` that matched this topic).
    pub fn recv(&self) -> Option<Event<P>> {
        self.rx.recv().ok()
    }

    /// Block until the next event or timeout expires
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Event<P>> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&self) -> Option<Event<P>> {
        self.rx.try_recv().ok()
    }

    /// Non-blocking iterator over events already queued
    pub fn try_iter(&self) -> TryIter<'_, P> {
        TryIter { inner: self }
    }

    /// Iterator that blocks for up to `timeout` on each call to `next()`
    /// and stops when the timeout expires without events
    pub fn timeout_iter(&self, timeout: Duration) -> TimeoutIter<'_, P> {
        TimeoutIter {
            inner: self,
            timeout,
        }
    }
}

impl<P: Send + Sync + 'static> Iterator for EventIterator<P> {
    type Item = Event<P>;

    fn next(&mut self) -> Option<Self::Item> {
        self.recv()
    }
}

impl<P: Send + Sync + 'static> Drop for EventIterator<P> {
    fn drop(&mut self) {
        if let Some(inner) = self.bus.upgrade() {
            EventBus::from_inner(inner).unsubscribe_handle(&self.subscription);
        }
    }
}

/// Non-blocking iterator over currently available events
pub struct TryIter<'a, P: Send + Sync + 'static> {
    inner: &'a EventIterator<P>,
}

impl<'a, P: Send + Sync + 'static> Iterator for TryIter<'a, P> {
    type Item = Event<P>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.try_recv()
    }
}

/// Blocking iterator with timeout
pub struct TimeoutIter<'a, P: Send + Sync + 'static> {
    inner: &'a EventIterator<P>,
    timeout: Duration,
}

impl<'a, P: Send + Sync + 'static> Iterator for TimeoutIter<'a, P> {
    type Item = Event<P>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.recv_timeout(self.timeout)
    }
}
