//! Event dispatch.
//!
//! Unsolicited frames never touch user code from the reading task directly:
//! the reader pushes them into a bounded queue and a dedicated task drains it
//! into the registered handlers, so a slow handler can stall at most event
//! delivery, never frame processing or response correlation. A full queue
//! drops the event.

use std::sync::Arc;

use meshtak_protocol::{
    EmergencyReceived, Event, GpsReceived, LogMessage, MessageReceived, NeighborChanged,
};
use parking_lot::Mutex;
use tracing::trace;

type Handler<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Routes events to at most one registered handler per event kind.
///
/// Registration replaces the previous handler (last one wins); clearing a
/// slot makes subsequent events of that kind drop silently.
#[derive(Default)]
pub struct EventDispatcher {
    message: Mutex<Option<Handler<MessageReceived>>>,
    gps: Mutex<Option<Handler<GpsReceived>>>,
    neighbor: Mutex<Option<Handler<NeighborChanged>>>,
    emergency: Mutex<Option<Handler<EmergencyReceived>>>,
    log: Mutex<Option<Handler<LogMessage>>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_message(&self, handler: Option<Handler<MessageReceived>>) {
        *self.message.lock() = handler;
    }

    pub fn set_gps(&self, handler: Option<Handler<GpsReceived>>) {
        *self.gps.lock() = handler;
    }

    pub fn set_neighbor(&self, handler: Option<Handler<NeighborChanged>>) {
        *self.neighbor.lock() = handler;
    }

    pub fn set_emergency(&self, handler: Option<Handler<EmergencyReceived>>) {
        *self.emergency.lock() = handler;
    }

    pub fn set_log(&self, handler: Option<Handler<LogMessage>>) {
        *self.log.lock() = handler;
    }

    /// Invokes the handler registered for this event's kind, if any.
    pub fn dispatch(&self, event: Event) {
        trace!(kind = %event.kind(), "dispatching event");
        match event {
            Event::Message(ev) => Self::invoke(&self.message, ev),
            Event::Gps(ev) => Self::invoke(&self.gps, ev),
            Event::Neighbor(ev) => Self::invoke(&self.neighbor, ev),
            Event::Emergency(ev) => Self::invoke(&self.emergency, ev),
            Event::Log(ev) => Self::invoke(&self.log, ev),
        }
    }

    // The handler is cloned out of the slot before the call so a handler may
    // re-register callbacks without deadlocking.
    fn invoke<T>(slot: &Mutex<Option<Handler<T>>>, payload: T) {
        let handler = slot.lock().clone();
        if let Some(handler) = handler {
            handler(payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn log_event(message: &str) -> Event {
        Event::Log(LogMessage {
            level: meshtak_protocol::LogLevel::Info,
            message: message.to_string(),
        })
    }

    #[test]
    fn test_unregistered_kind_drops_silently() {
        let dispatcher = EventDispatcher::new();
        dispatcher.dispatch(log_event("nobody listening"));
    }

    #[test]
    fn test_handler_invoked() {
        let dispatcher = EventDispatcher::new();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        dispatcher.set_log(Some(Arc::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        })));

        dispatcher.dispatch(log_event("one"));
        dispatcher.dispatch(log_event("two"));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_last_registration_wins() {
        let dispatcher = EventDispatcher::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let seen = first.clone();
        dispatcher.set_log(Some(Arc::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        })));
        let seen = second.clone();
        dispatcher.set_log(Some(Arc::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        })));

        dispatcher.dispatch(log_event("routed"));
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cleared_handler_drops_events() {
        let dispatcher = EventDispatcher::new();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        dispatcher.set_log(Some(Arc::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        })));

        dispatcher.dispatch(log_event("counted"));
        dispatcher.set_log(None);
        dispatcher.dispatch(log_event("dropped"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_kinds_are_independent() {
        let dispatcher = EventDispatcher::new();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        dispatcher.set_message(Some(Arc::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        })));

        // A log event must not reach the message handler.
        dispatcher.dispatch(log_event("wrong kind"));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
