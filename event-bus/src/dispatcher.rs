//! Dispatch loop
//!
//! One dispatch thread drains the bounded event queue. For each event it takes
//! a snapshot of the topic's callbacks and hands every invocation to the
//! blocking pool of a small tokio runtime owned by the loop, so handlers run
//! concurrently with each other and with the next dispatched event. A watcher
//! task observes each invocation and records its outcome.
//!
//! The loop ends when every sender is gone (the bus dropped its handle after
//! the last unsubscribe and no publish is in flight) or when the bus itself
//! has been dropped.

use std::io;
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};
use tokio::task::JoinHandle;

use crate::bus::BusInner;
use crate::callback::{CallbackId, HandlerResult};
use crate::config::BusConfig;
use crate::event::Event;
use crate::stats::BusStats;

/// Handle to a running dispatch loop, held by the bus while it has subscribers
pub(crate) struct Dispatcher<P> {
    sender: Sender<Arc<Event<P>>>,
    generation: u64,
}

impl<P> Dispatcher<P>
where
    P: Send + Sync + 'static,
{
    /// Spawn a new dispatch thread
    pub(crate) fn spawn(
        bus: Weak<BusInner<P>>,
        config: &BusConfig,
        stats: Arc<BusStats>,
        generation: u64,
    ) -> io::Result<Self> {
        let (sender, receiver) = channel::bounded(config.queue_capacity);
        let handler_threads = config.handler_threads;
        let grace = config.shutdown_grace;

        thread::Builder::new()
            .name(format!("event-bus-dispatch-{}", generation))
            .spawn(move || {
                run_dispatch_loop(bus, receiver, stats, handler_threads, grace, generation);
            })?;

        Ok(Self { sender, generation })
    }

    pub(crate) fn sender(&self) -> Sender<Arc<Event<P>>> {
        self.sender.clone()
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }
}

fn run_dispatch_loop<P>(
    bus: Weak<BusInner<P>>,
    receiver: Receiver<Arc<Event<P>>>,
    stats: Arc<BusStats>,
    handler_threads: usize,
    grace: Duration,
    generation: u64,
) where
    P: Send + Sync + 'static,
{
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .max_blocking_threads(handler_threads)
        .thread_name(format!("event-bus-handler-{}", generation))
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create handler runtime for dispatch loop {}: {}", generation, e);
            return;
        }
    };

    tracing::debug!("Dispatch loop {} started", generation);

    while let Ok(event) = receiver.recv() {
        let callbacks = match bus.upgrade() {
            Some(inner) => inner.snapshot(&event.topic, generation),
            None => {
                tracing::debug!("Event bus dropped, dispatch loop {} exiting", generation);
                break;
            }
        };

        stats.record_dispatched();

        if callbacks.is_empty() {
            tracing::trace!("No callbacks for `{}`", event.topic);
            continue;
        }

        tracing::trace!("Dispatching `{}` to {} callback(s)", event.topic, callbacks.len());

        for callback in callbacks {
            let id = callback.id();
            let shared = Arc::clone(&event);
            let task = runtime.spawn_blocking(move || callback.invoke(&shared));
            runtime.spawn(observe_handler(
                task,
                event.topic.clone(),
                id,
                Arc::clone(&stats),
            ));
        }
    }

    runtime.shutdown_timeout(grace);
    tracing::debug!("Dispatch loop {} stopped", generation);
}

async fn observe_handler(
    task: JoinHandle<HandlerResult>,
    topic: String,
    callback: CallbackId,
    stats: Arc<BusStats>,
) {
    match task.await {
        Ok(Ok(())) => stats.record_delivered(),
        Ok(Err(e)) => {
            stats.record_failed();
            tracing::warn!(topic = %topic, callback = %callback, "Event handler failed: {}", e);
        }
        Err(e) if e.is_panic() => {
            stats.record_failed();
            tracing::error!(topic = %topic, callback = %callback, "Event handler panicked");
        }
        Err(e) => {
            stats.record_failed();
            tracing::debug!(topic = %topic, callback = %callback, "Event handler cancelled: {}", e);
        }
    }
}
