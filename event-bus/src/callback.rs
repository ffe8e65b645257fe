//! Subscriber callbacks with stable identity
//!
//! Closures cannot be compared, so each `Callback` carries a process-unique
//! `CallbackId`. Cloning a callback keeps its identity, which lets the same
//! callback be registered on several topics and removed from all of them.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::event::Event;

/// Error type returned by failing handlers
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result type returned by handlers
pub type HandlerResult = Result<(), HandlerError>;

static NEXT_CALLBACK_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a registered callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackId(u64);

impl CallbackId {
    fn next() -> Self {
        Self(NEXT_CALLBACK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cb#{}", self.0)
    }
}

type Handler<P> = dyn Fn(&Event<P>) -> HandlerResult + Send + Sync;

/// A handler invoked for every event on the topics it is subscribed to
///
/// # Example
///
/// ```rust
/// use event_bus::{Callback, Event};
///
/// let cb: Callback<u32> = Callback::from_fn(|event: &Event<u32>| {
///     println!("{} -> {}", event.topic(), event.payload());
/// });
/// let same = cb.clone();
/// assert_eq!(cb.id(), same.id());
/// ```
pub struct Callback<P> {
    id: CallbackId,
    handler: Arc<Handler<P>>,
}

impl<P> Callback<P> {
    /// Wrap a fallible handler
    ///
    /// Errors returned by the handler are recorded in the bus statistics
    /// and logged; they never reach the publisher.
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&Event<P>) -> HandlerResult + Send + Sync + 'static,
    {
        Self {
            id: CallbackId::next(),
            handler: Arc::new(handler),
        }
    }

    /// Wrap a handler that cannot fail
    pub fn from_fn<F>(handler: F) -> Self
    where
        F: Fn(&Event<P>) + Send + Sync + 'static,
    {
        Self::new(move |event| {
            handler(event);
            Ok(())
        })
    }

    /// Identity of this callback
    pub fn id(&self) -> CallbackId {
        self.id
    }

    pub(crate) fn invoke(&self, event: &Event<P>) -> HandlerResult {
        (self.handler)(event)
    }
}

impl<P> Clone for Callback<P> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<P> fmt::Debug for Callback<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback").field("id", &self.id).finish()
    }
}

impl<P> PartialEq for Callback<P> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<P> Eq for Callback<P> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let a: Callback<()> = Callback::from_fn(|_| {});
        let b: Callback<()> = Callback::from_fn(|_| {});
        assert_ne!(a.id(), b.id());
        assert_ne!(a, b);
    }

    #[test]
    fn test_clone_keeps_identity() {
        let a: Callback<()> = Callback::from_fn(|_| {});
        assert_eq!(a.clone(), a);
    }

    #[test]
    fn test_invoke_propagates_handler_error() {
        let cb: Callback<u8> = Callback::new(|event| {
            if event.payload == 0 {
                Err("zero".into())
            } else {
                Ok(())
            }
        });
        assert!(cb.invoke(&Event::new("t", 1)).is_ok());
        assert!(cb.invoke(&Event::new("t", 0)).is_err());
    }
}
