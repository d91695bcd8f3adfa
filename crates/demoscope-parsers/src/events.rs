//! Synchronous, ordered event fan-out.
//!
//! Listeners run on the decoding thread in registration order, for every
//! event, in the order events are raised. A slow listener stalls decoding.

use crate::dem::{DemoHeader, Player, PlayerHandle};

/// Events raised while decoding a demo
#[derive(Debug, Clone)]
pub enum DemoEvent<'a> {
    /// The header was read and validated
    HeaderParsed { header: DemoHeader },
    /// A connection was seen for the first time with a non-zero steam id
    PlayerIdentified {
        handle: PlayerHandle,
        player: &'a Player,
    },
    /// A frame and its reconciliation finished
    TickComplete,
}

impl DemoEvent<'_> {
    /// Short name of the event kind, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            DemoEvent::HeaderParsed { .. } => "header_parsed",
            DemoEvent::PlayerIdentified { .. } => "player_identified",
            DemoEvent::TickComplete => "tick_complete",
        }
    }
}

/// Identifies a registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&DemoEvent<'_>) + Send>;

/// Registry of listeners and the dispatch loop
#[derive(Default)]
pub struct EventDispatcher {
    listeners: Vec<(ListenerId, Listener)>,
    next_id: u64,
    dispatched: u64,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener that sees every event
    pub fn register<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&DemoEvent<'_>) + Send + 'static,
    {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn unregister(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    /// Deliver `event` to every listener, in registration order
    pub fn dispatch(&mut self, event: &DemoEvent<'_>) {
        tracing::trace!(kind = event.kind(), listeners = self.listeners.len(), "Dispatching event");
        self.dispatched += 1;
        for (_, listener) in self.listeners.iter_mut() {
            listener(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Number of events dispatched so far
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("listeners", &self.listeners.len())
            .field("dispatched", &self.dispatched)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use parking_lot::Mutex;

    #[test]
    fn test_listeners_run_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = EventDispatcher::new();

        for name in ["first", "second"] {
            let log = Arc::clone(&log);
            dispatcher.register(move |event| log.lock().push(format!("{}:{}", name, event.kind())));
        }

        dispatcher.dispatch(&DemoEvent::TickComplete);

        assert_eq!(
            *log.lock(),
            vec!["first:tick_complete", "second:tick_complete"]
        );
        assert_eq!(dispatcher.dispatched(), 1);
    }

    #[test]
    fn test_unregister() {
        let count = Arc::new(Mutex::new(0));
        let mut dispatcher = EventDispatcher::new();
        let id = {
            let count = Arc::clone(&count);
            dispatcher.register(move |_| *count.lock() += 1)
        };

        dispatcher.dispatch(&DemoEvent::TickComplete);
        assert!(dispatcher.unregister(id));
        assert!(!dispatcher.unregister(id));
        dispatcher.dispatch(&DemoEvent::TickComplete);

        assert_eq!(*count.lock(), 1);
        assert_eq!(dispatcher.listener_count(), 0);
    }

    #[test]
    fn test_dispatch_without_listeners() {
        let mut dispatcher = EventDispatcher::new();
        dispatcher.dispatch(&DemoEvent::HeaderParsed {
            header: DemoHeader::default(),
        });
        assert_eq!(dispatcher.dispatched(), 1);
    }
}
