//! Topic-based publish/subscribe bus
//!
//! The bus starts dormant. The first subscription spawns a dispatch loop;
//! removing the last subscription tears it down again, after which publishes
//! are silent no-ops until someone subscribes. A bus can cycle through this
//! any number of times.

use std::collections::HashMap;
use std::sync::Arc;

use crossbeam::channel;
use parking_lot::Mutex;

use crate::callback::{Callback, CallbackId, HandlerError};
use crate::config::BusConfig;
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::event::Event;
use crate::iter::EventIterator;
use crate::pattern::TopicPattern;
use crate::stats::{BusStats, StatsSnapshot};

// ============================================================================
// Subscription
// ============================================================================

/// Receipt for one callback registered on one topic
///
/// Dropping a `Subscription` does not unsubscribe; pass it to
/// [`EventBus::unsubscribe_handle`] to remove the callback.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    topic: String,
    callback: CallbackId,
}

impl Subscription {
    fn new(topic: &str, callback: CallbackId) -> Self {
        Self {
            topic: topic.to_string(),
            callback,
        }
    }

    /// Topic the callback was registered on
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Identity of the registered callback
    pub fn callback_id(&self) -> CallbackId {
        self.callback
    }
}

// ============================================================================
// Internal state
// ============================================================================

struct BusState<P> {
    topics: HashMap<String, Vec<Callback<P>>>,
    dispatcher: Option<Dispatcher<P>>,
    generation: u64,
}

pub(crate) struct BusInner<P> {
    state: Mutex<BusState<P>>,
    config: BusConfig,
    stats: Arc<BusStats>,
}

impl<P> BusInner<P> {
    /// Callbacks for `topic`, as seen by the dispatch loop of `generation`
    ///
    /// A loop that has been torn down gets nothing, even if a newer loop
    /// has registered callbacks since.
    pub(crate) fn snapshot(&self, topic: &str, generation: u64) -> Vec<Callback<P>> {
        let state = self.state.lock();
        if state.generation != generation || state.dispatcher.is_none() {
            return Vec::new();
        }
        state.topics.get(topic).cloned().unwrap_or_default()
    }
}

fn remove_callback<P>(
    topics: &mut HashMap<String, Vec<Callback<P>>>,
    topic: &str,
    id: CallbackId,
) -> bool {
    let Some(callbacks) = topics.get_mut(topic) else {
        return false;
    };
    let before = callbacks.len();
    callbacks.retain(|cb| cb.id() != id);
    let removed = callbacks.len() != before;
    if callbacks.is_empty() {
        topics.remove(topic);
    }
    removed
}

// ============================================================================
// EventBus
// ============================================================================

/// Publish/subscribe bus keyed by string topics
///
/// Cloning an `EventBus` yields another handle to the same bus.
///
/// # Example
///
/// ```rust
/// use event_bus::{Callback, EventBus};
/// use std::sync::mpsc;
/// use std::time::Duration;
///
/// let bus: EventBus<u32> = EventBus::new();
/// let (tx, rx) = mpsc::channel();
/// let tx = std::sync::Mutex::new(tx);
/// let cb = Callback::from_fn(move |event| {
///     let _ = tx.lock().unwrap().send(*event.payload());
/// });
///
/// bus.subscribe("device123.changed", &cb);
/// bus.publish("device123.changed", 7);
/// assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), 7);
///
/// bus.unsubscribe_all("device123.*");
/// assert!(bus.is_dormant());
/// ```
pub struct EventBus<P> {
    inner: Arc<BusInner<P>>,
}

impl<P> Clone for EventBus<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P> Default for EventBus<P>
where
    P: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<P> std::fmt::Debug for EventBus<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("EventBus")
            .field("topics", &state.topics.len())
            .field("dispatching", &state.dispatcher.is_some())
            .finish()
    }
}

impl<P> EventBus<P>
where
    P: Send + Sync + 'static,
{
    /// Create a dormant bus with the default configuration
    pub fn new() -> Self {
        Self::build(BusConfig::default())
    }

    /// Create a dormant bus with a custom configuration
    pub fn with_config(config: BusConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: BusConfig) -> Self {
        Self {
            inner: Arc::new(BusInner {
                state: Mutex::new(BusState {
                    topics: HashMap::new(),
                    dispatcher: None,
                    generation: 0,
                }),
                config,
                stats: Arc::new(BusStats::default()),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<BusInner<P>>) -> Self {
        Self { inner }
    }

    // ========================================================================
    // Subscribing
    // ========================================================================

    /// Register `callback` for every future publish on `topic`
    ///
    /// Registering the same callback twice on one topic is a no-op. Starts
    /// the dispatch loop if the bus is dormant.
    ///
    /// # Panics
    ///
    /// Panics if `topic` is empty.
    pub fn subscribe(&self, topic: &str, callback: &Callback<P>) -> Subscription {
        assert!(!topic.is_empty(), "Cannot use an empty string as event name");

        let mut state = self.inner.state.lock();
        self.ensure_dispatcher(&mut state);

        let callbacks = state.topics.entry(topic.to_string()).or_default();
        if callbacks.iter().any(|cb| cb.id() == callback.id()) {
            tracing::trace!("{} already subscribed to `{}`", callback.id(), topic);
        } else {
            callbacks.push(callback.clone());
            tracing::debug!("{} subscribed to `{}`", callback.id(), topic);
        }

        Subscription::new(topic, callback.id())
    }

    /// Subscribe a closure, returning the callback for later removal
    pub fn subscribe_fn<F>(&self, topic: &str, handler: F) -> Callback<P>
    where
        F: Fn(&Event<P>) + Send + Sync + 'static,
    {
        let callback = Callback::from_fn(handler);
        self.subscribe(topic, &callback);
        callback
    }

    /// Subscribe an iterator that receives a copy of each event on `topic`
    ///
    /// The subscription is removed when the iterator is dropped.
    pub fn iter(&self, topic: &str) -> EventIterator<P>
    where
        P: Clone,
    {
        let (tx, rx) = channel::unbounded();
        let callback = Callback::new(move |event: &Event<P>| {
            tx.send(event.clone())
                .map_err(|e| HandlerError::from(e.to_string()))
        });
        let subscription = self.subscribe(topic, &callback);
        EventIterator::new(rx, Arc::downgrade(&self.inner), subscription)
    }

    fn ensure_dispatcher(&self, state: &mut BusState<P>) {
        if state.dispatcher.is_some() {
            return;
        }
        state.generation += 1;
        match Dispatcher::spawn(
            Arc::downgrade(&self.inner),
            &self.inner.config,
            Arc::clone(&self.inner.stats),
            state.generation,
        ) {
            Ok(dispatcher) => {
                tracing::debug!("Started dispatch loop {}", dispatcher.generation());
                state.dispatcher = Some(dispatcher);
            }
            Err(e) => {
                tracing::error!("Failed to spawn dispatch thread: {}", e);
            }
        }
    }

    // ========================================================================
    // Unsubscribing
    // ========================================================================

    /// Remove `callback` from `topic`
    ///
    /// Returns `true` if it was registered there.
    pub fn unsubscribe(&self, topic: &str, callback: &Callback<P>) -> bool {
        self.remove_by_id(topic, callback.id())
    }

    /// Remove the callback recorded by `subscription`
    pub fn unsubscribe_handle(&self, subscription: &Subscription) -> bool {
        self.remove_by_id(&subscription.topic, subscription.callback)
    }

    fn remove_by_id(&self, topic: &str, id: CallbackId) -> bool {
        let mut state = self.inner.state.lock();
        let removed = remove_callback(&mut state.topics, topic, id);
        if removed {
            tracing::debug!("{} unsubscribed from `{}`", id, topic);
        }
        Self::teardown_if_idle(&mut state);
        removed
    }

    /// Remove listeners from every topic matching `pattern`
    ///
    /// `*` in the pattern matches any run of characters, and a bare `*`
    /// matches every topic. With `Some(callback)` only that callback is
    /// removed from the matching topics; with `None` the matching topics
    /// lose all of their listeners. Returns the number of registrations
    /// removed.
    pub fn remove_listeners(&self, pattern: &str, callback: Option<&Callback<P>>) -> usize {
        let pattern = TopicPattern::new(pattern);
        let mut state = self.inner.state.lock();

        let matching: Vec<String> = state
            .topics
            .keys()
            .filter(|topic| pattern.matches(topic))
            .cloned()
            .collect();

        let mut removed = 0;
        for topic in &matching {
            match callback {
                Some(cb) => {
                    if remove_callback(&mut state.topics, topic, cb.id()) {
                        removed += 1;
                    }
                }
                None => {
                    removed += state.topics.remove(topic).map_or(0, |cbs| cbs.len());
                }
            }
        }

        if removed > 0 {
            tracing::debug!(
                "Removed {} listener(s) matching `{}` across {} topic(s)",
                removed,
                pattern.as_str(),
                matching.len()
            );
        }

        Self::teardown_if_idle(&mut state);
        removed
    }

    /// Remove every listener on every topic matching `pattern`
    pub fn unsubscribe_all(&self, pattern: &str) -> usize {
        self.remove_listeners(pattern, None)
    }

    /// Remove every listener and return the bus to its dormant state
    pub fn clear(&self) -> usize {
        self.unsubscribe_all("*")
    }

    fn teardown_if_idle(state: &mut BusState<P>) {
        if !state.topics.is_empty() {
            return;
        }
        if let Some(dispatcher) = state.dispatcher.take() {
            // Dropping the last sender lets the loop drain and exit
            tracing::debug!(
                "No subscribers left, stopping dispatch loop {}",
                dispatcher.generation()
            );
        }
    }

    // ========================================================================
    // Publishing
    // ========================================================================

    /// Publish `payload` on `topic`
    ///
    /// Returns immediately. Handlers run later on the dispatch loop; their
    /// failures are never reported here. Publishing while the bus is dormant
    /// discards the event.
    ///
    /// # Panics
    ///
    /// Panics if `topic` is empty.
    pub fn publish(&self, topic: &str, payload: P) {
        assert!(!topic.is_empty(), "Cannot use an empty string as event name");

        self.inner.stats.record_published();

        let sender = {
            let state = self.inner.state.lock();
            state.dispatcher.as_ref().map(Dispatcher::sender)
        };

        let Some(sender) = sender else {
            self.inner.stats.record_dropped();
            tracing::trace!("Bus dormant, dropping event on `{}`", topic);
            return;
        };

        if sender.send(Arc::new(Event::new(topic, payload))).is_err() {
            // The loop went away between the lookup and the send
            self.inner.stats.record_dropped();
            tracing::trace!("Dispatch loop gone, dropping event on `{}`", topic);
        }
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Topics with at least one listener, sorted
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.inner.state.lock().topics.keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Number of callbacks registered on `topic`
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner
            .state
            .lock()
            .topics
            .get(topic)
            .map_or(0, Vec::len)
    }

    /// Whether `callback` is registered on `topic`
    pub fn is_subscribed(&self, topic: &str, callback: &Callback<P>) -> bool {
        self.inner
            .state
            .lock()
            .topics
            .get(topic)
            .is_some_and(|cbs| cbs.iter().any(|cb| cb.id() == callback.id()))
    }

    /// True when no dispatch loop is running
    pub fn is_dormant(&self) -> bool {
        self.inner.state.lock().dispatcher.is_none()
    }

    /// Delivery counters
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }
}
