// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Cross-core event manager.
//!
//! Each core owns one [`CoreEvents`]. The peer core raises events on it, which runs the
//! handler registered for that event kind in "interrupt context": the handler must not
//! block and must not allocate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::trace;
use parking_lot::RwLock;

/// Event kinds carried by the inter-core interrupt line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventKind {
    /// Progress on a shared-memory message buffer; payload is the channel offset.
    MessageBuffers = 0,
    /// Application-defined handshake value sent by the remote core at start-up.
    RemoteApplication = 1,
}

const EVENT_KINDS: usize = 2;

impl EventKind {
    const fn index(self) -> usize {
        self as usize
    }
}

/// Handler invoked when an event is raised. Receives the 16-bit event payload.
pub type EventHandler = Arc<dyn Fn(u16) + Send + Sync>;

/// Anything that can receive a raised cross-core event.
pub trait EventSink: Send + Sync {
    /// Raises `kind` with `data` on this sink.
    fn raise(&self, kind: EventKind, data: u16);
}

/// Event manager of a single core.
pub struct CoreEvents {
    name: &'static str,
    handlers: RwLock<[Option<EventHandler>; EVENT_KINDS]>,
    dropped: AtomicU64,
}

impl CoreEvents {
    /// Creates an event manager with no handlers registered.
    pub fn new(name: &'static str) -> Self {
        Self { name, handlers: RwLock::new([None, None]), dropped: AtomicU64::new(0) }
    }

    /// Name of the owning core, used in diagnostics.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Installs `handler` for `kind`, replacing any previous registration.
    pub fn register(&self, kind: EventKind, handler: EventHandler) {
        self.handlers.write()[kind.index()] = Some(handler);
    }

    /// Removes the handler for `kind`.
    pub fn unregister(&self, kind: EventKind) {
        self.handlers.write()[kind.index()] = None;
    }

    /// Returns true if a handler is installed for `kind`.
    pub fn is_registered(&self, kind: EventKind) -> bool {
        self.handlers.read()[kind.index()].is_some()
    }

    /// Number of events raised while no handler was registered.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl EventSink for CoreEvents {
    fn raise(&self, kind: EventKind, data: u16) {
        // Clone out of the lock so a handler may re-register without deadlocking.
        let handler = self.handlers.read()[kind.index()].clone();
        match handler {
            Some(handler) => handler(data),
            None => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                trace!("{}: no handler for {kind:?} (data={data:#06x})", self.name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn raise_runs_registered_handler() {
        let events = CoreEvents::new("primary");
        let seen = Arc::new(AtomicU32::new(0));
        let sink = seen.clone();
        events.register(
            EventKind::MessageBuffers,
            Arc::new(move |data: u16| {
                sink.store(u32::from(data), Ordering::SeqCst);
            }),
        );
        events.raise(EventKind::MessageBuffers, 0x1000);
        assert_eq!(seen.load(Ordering::SeqCst), 0x1000);
        assert_eq!(events.dropped(), 0);
    }

    #[test]
    fn unhandled_events_are_counted() {
        let events = CoreEvents::new("companion");
        events.raise(EventKind::RemoteApplication, 1);
        events.raise(EventKind::MessageBuffers, 2);
        assert_eq!(events.dropped(), 2);
    }

    #[test]
    fn registration_is_last_writer_wins() {
        let events = CoreEvents::new("primary");
        let hits = Arc::new(AtomicU32::new(0));
        let first = hits.clone();
        events.register(
            EventKind::MessageBuffers,
            Arc::new(move |_: u16| {
                first.fetch_add(1, Ordering::SeqCst);
            }),
        );
        let second = hits.clone();
        events.register(
            EventKind::MessageBuffers,
            Arc::new(move |_: u16| {
                second.fetch_add(10, Ordering::SeqCst);
            }),
        );
        events.raise(EventKind::MessageBuffers, 0);
        assert_eq!(hits.load(Ordering::SeqCst), 10);

        events.unregister(EventKind::MessageBuffers);
        assert!(!events.is_registered(EventKind::MessageBuffers));
    }
}
