//! Observer registry
//!
//! Any number of observers per event kind; each registration returns a
//! [`Subscription`] that removes exactly that observer. Callbacks run on the
//! engine task, in registration order, and may register or unsubscribe other
//! observers (the list is snapshotted before dispatch).

use crate::core::connection_state::ConnectionStatus;
use crate::traits::{Message, MessageType, RealtimeError};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Event stream item for channel subscribers
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Status changed (previous, current)
    StatusChanged {
        from: ConnectionStatus,
        to: ConnectionStatus,
    },
    /// Channel opened
    Connected,
    /// Channel closed cleanly or explicitly
    Disconnected,
    /// Reconnection scheduled (attempt number, delay before it)
    Reconnecting { attempt: u32, delay: Duration },
    /// Message received from the server
    Message(Message),
    /// Error occurred
    Error(RealtimeError),
}

type StatusFn = Arc<dyn Fn(ConnectionStatus, ConnectionStatus) + Send + Sync>;
type UnitFn = Arc<dyn Fn() + Send + Sync>;
type ErrorFn = Arc<dyn Fn(&RealtimeError) + Send + Sync>;
type MessageFn = Arc<dyn Fn(&Message) + Send + Sync>;

#[derive(Clone)]
enum Observer {
    Status(StatusFn),
    Connect(UnitFn),
    Disconnect(UnitFn),
    Error(ErrorFn),
    Message(Option<MessageType>, MessageFn),
    Stream(Sender<ClientEvent>),
}

/// Handle returned by every registration
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    registry: Weak<Observers>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remove the observer
    ///
    /// Returns false if it was already gone (or the manager was dropped).
    pub fn unsubscribe(self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => registry.remove(self.id),
            None => false,
        }
    }
}

#[derive(Default)]
pub struct Observers {
    next_id: AtomicU64,
    entries: RwLock<Vec<(u64, Observer)>>,
}

impl Observers {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn on_status_change<F>(self: &Arc<Self>, f: F) -> Subscription
    where
        F: Fn(ConnectionStatus, ConnectionStatus) + Send + Sync + 'static,
    {
        self.add(Observer::Status(Arc::new(f)))
    }

    pub fn on_connect<F>(self: &Arc<Self>, f: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.add(Observer::Connect(Arc::new(f)))
    }

    pub fn on_disconnect<F>(self: &Arc<Self>, f: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.add(Observer::Disconnect(Arc::new(f)))
    }

    pub fn on_error<F>(self: &Arc<Self>, f: F) -> Subscription
    where
        F: Fn(&RealtimeError) + Send + Sync + 'static,
    {
        self.add(Observer::Error(Arc::new(f)))
    }

    /// Every incoming non-heartbeat message
    pub fn on_message<F>(self: &Arc<Self>, f: F) -> Subscription
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.add(Observer::Message(None, Arc::new(f)))
    }

    /// Incoming messages of one type only
    pub fn on_message_type<F>(self: &Arc<Self>, kind: MessageType, f: F) -> Subscription
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.add(Observer::Message(Some(kind), Arc::new(f)))
    }

    /// Channel of every [`ClientEvent`]
    pub fn subscribe(self: &Arc<Self>) -> (Receiver<ClientEvent>, Subscription) {
        let (tx, rx) = unbounded();
        (rx, self.add(Observer::Stream(tx)))
    }

    pub(crate) fn status_changed(&self, from: ConnectionStatus, to: ConnectionStatus) {
        for observer in self.snapshot() {
            if let Observer::Status(f) = observer {
                f(from, to);
            }
        }
        self.stream(ClientEvent::StatusChanged { from, to });
    }

    pub(crate) fn connected(&self) {
        for observer in self.snapshot() {
            if let Observer::Connect(f) = observer {
                f();
            }
        }
        self.stream(ClientEvent::Connected);
    }

    pub(crate) fn disconnected(&self) {
        for observer in self.snapshot() {
            if let Observer::Disconnect(f) = observer {
                f();
            }
        }
        self.stream(ClientEvent::Disconnected);
    }

    pub(crate) fn error(&self, error: &RealtimeError) {
        for observer in self.snapshot() {
            if let Observer::Error(f) = observer {
                f(error);
            }
        }
        self.stream(ClientEvent::Error(error.clone()));
    }

    pub(crate) fn reconnecting(&self, attempt: u32, delay: Duration) {
        self.stream(ClientEvent::Reconnecting { attempt, delay });
    }

    pub(crate) fn message(&self, message: &Message) {
        for observer in self.snapshot() {
            if let Observer::Message(filter, f) = observer {
                if filter.map_or(true, |kind| kind == message.kind()) {
                    f(message);
                }
            }
        }
        self.stream(ClientEvent::Message(message.clone()));
    }

    fn add(self: &Arc<Self>, observer: Observer) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.write().push((id, observer));
        Subscription {
            id,
            registry: Arc::downgrade(self),
        }
    }

    fn remove(&self, id: u64) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    fn snapshot(&self) -> Vec<Observer> {
        self.entries.read().iter().map(|(_, o)| o.clone()).collect()
    }

    fn stream(&self, event: ClientEvent) {
        let mut dead = Vec::new();
        for (id, observer) in self.entries.read().iter() {
            if let Observer::Stream(tx) = observer {
                if tx.send(event.clone()).is_err() {
                    dead.push(*id);
                }
            }
        }
        // Receiver dropped: the subscriber is gone
        for id in dead {
            self.remove(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_multiple_observers_coexist() {
        let observers = Observers::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let h1 = Arc::clone(&hits);
        let _a = observers.on_connect(move || {
            h1.fetch_add(1, Ordering::SeqCst);
        });
        let h2 = Arc::clone(&hits);
        let _b = observers.on_connect(move || {
            h2.fetch_add(10, Ordering::SeqCst);
        });

        observers.connected();
        assert_eq!(hits.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn test_unsubscribe_removes_only_that_observer() {
        let observers = Observers::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s1 = Arc::clone(&seen);
        let first = observers.on_status_change(move |_, to| s1.lock().push(("first", to)));
        let s2 = Arc::clone(&seen);
        let _second = observers.on_status_change(move |_, to| s2.lock().push(("second", to)));

        assert!(first.unsubscribe());
        observers.status_changed(ConnectionStatus::Disconnected, ConnectionStatus::Connecting);

        assert_eq!(*seen.lock(), vec![("second", ConnectionStatus::Connecting)]);
    }

    #[test]
    fn test_message_type_filter() {
        let observers = Observers::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let _sub = observers.on_message_type(MessageType::Notification, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        observers.message(&Message::notification(json!(1)));
        observers.message(&Message::new(MessageType::StatusUpdate, json!(2)));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stream_receives_events_and_prunes_dropped() {
        let observers = Observers::new();
        let (rx, _sub) = observers.subscribe();

        observers.error(&RealtimeError::NotConnected);
        assert!(matches!(rx.try_recv(), Ok(ClientEvent::Error(RealtimeError::NotConnected))));

        drop(rx);
        observers.connected();
        assert!(observers.is_empty());
    }

    #[test]
    fn test_unsubscribe_after_registry_dropped() {
        let observers = Observers::new();
        let sub = observers.on_disconnect(|| {});
        drop(observers);
        assert!(!sub.unsubscribe());
    }
}
