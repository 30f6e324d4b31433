//! Client-side event fan-out.
//!
//! Every inbound message, decode failure and transport fault is delivered to
//! two kinds of subscriber:
//!
//! * [`MessageListener`]s registered with
//!   [`NotificationBus::add_listener`], called synchronously and in
//!   registration order on the dispatcher task. A listener must return
//!   promptly; it holds up every message behind it.
//! * [`tokio::sync::broadcast`] receivers from
//!   [`NotificationBus::subscribe`]. A slow receiver loses the oldest events
//!   rather than stalling the dispatcher. Drop the receiver to unsubscribe.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tactus_protocol::ServerMessage;
use tactus_types::TactusError;
use tokio::sync::broadcast;
use tracing::{error, warn};

/// What the dispatcher reports to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// A decoded server message, after the registry has applied it.
    Message(ServerMessage),
    /// A frame or batch entry that could not be decoded. Dispatch continues.
    ProtocolError(TactusError),
    /// The transport reported a fault.
    TransportError(String),
    /// The socket closed.
    Disconnected,
}

/// Synchronous observer of [`ClientEvent`]s.
pub trait MessageListener: Send + Sync {
    fn on_event(&self, event: &ClientEvent);
}

impl<F> MessageListener for F
where
    F: Fn(&ClientEvent) + Send + Sync,
{
    fn on_event(&self, event: &ClientEvent) {
        self(event)
    }
}

/// Handle returned by [`NotificationBus::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listeners = Vec<(ListenerId, Arc<dyn MessageListener>)>;

pub struct NotificationBus {
    sender: broadcast::Sender<ClientEvent>,
    listeners: RwLock<Listeners>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for NotificationBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationBus")
            .field("receivers", &self.sender.receiver_count())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl NotificationBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn add_listener(&self, listener: impl MessageListener + 'static) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(listener)));
        id
    }

    /// Returns `false` when `id` was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.sender.subscribe()
    }

    /// Deliver `event` to every listener, then to every broadcast receiver.
    ///
    /// The listener list is copied first so a listener may add or remove
    /// listeners from inside its callback. A panicking listener is logged
    /// and skipped.
    pub fn notify(&self, event: ClientEvent) {
        let listeners: Vec<Arc<dyn MessageListener>> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            if panic::catch_unwind(AssertUnwindSafe(|| listener.on_event(&event))).is_err() {
                error!("message listener panicked; event skipped for that listener");
            }
        }
        // No receivers is a normal condition.
        let _ = self.sender.send(event);
    }
}

/// Await the next event, skipping over any the receiver lagged past.
pub async fn next_event(receiver: &mut broadcast::Receiver<ClientEvent>) -> Option<ClientEvent> {
    loop {
        match receiver.recv().await {
            Ok(event) => return Some(event),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "event subscriber lagged; events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use tactus_protocol::Bare;

    #[test]
    fn listeners_run_in_registration_order() {
        let bus = NotificationBus::new(8);
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second"] {
            let seen = Arc::clone(&seen);
            bus.add_listener(move |_: &ClientEvent| seen.lock().unwrap().push(tag));
        }
        bus.notify(ClientEvent::Disconnected);
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn removed_listener_stops_receiving() {
        let bus = NotificationBus::new(8);
        let hits = Arc::new(AtomicU64::new(0));
        let id = {
            let hits = Arc::clone(&hits);
            bus.add_listener(move |_: &ClientEvent| {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };
        bus.notify(ClientEvent::Disconnected);
        assert!(bus.remove_listener(id));
        assert!(!bus.remove_listener(id));
        bus.notify(ClientEvent::Disconnected);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    fn faulty(_: &ClientEvent) {
        panic!("listener bug");
    }

    #[test]
    fn panicking_listener_does_not_block_the_rest() {
        let bus = NotificationBus::new(8);
        let hits = Arc::new(AtomicU64::new(0));
        bus.add_listener(faulty);
        {
            let hits = Arc::clone(&hits);
            bus.add_listener(move |_: &ClientEvent| {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }
        bus.notify(ClientEvent::Disconnected);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn broadcast_subscribers_each_get_every_event() {
        let bus = NotificationBus::new(8);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        let msg = ClientEvent::Message(ServerMessage::Ok(Bare { id: 3 }));
        bus.notify(msg.clone());
        assert_eq!(next_event(&mut a).await, Some(msg.clone()));
        assert_eq!(next_event(&mut b).await, Some(msg));
    }

    #[tokio::test]
    async fn lagged_subscriber_resumes_with_newest() {
        let bus = NotificationBus::new(2);
        let mut rx = bus.subscribe();
        for id in 0..5 {
            bus.notify(ClientEvent::Message(ServerMessage::Ok(Bare { id })));
        }
        assert_eq!(
            next_event(&mut rx).await,
            Some(ClientEvent::Message(ServerMessage::Ok(Bare { id: 3 })))
        );
    }

    #[test]
    fn notify_without_subscribers_is_fine() {
        NotificationBus::new(4).notify(ClientEvent::TransportError("reset".to_string()));
    }
}
