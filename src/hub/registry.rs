//! Hub event loop and observer registry.
//!
//! The hub owns every observer's outbound queue. Producers talk to it only
//! through a cloneable [`HubHandle`]; the hub never waits on an observer, so
//! a full queue gets that observer dropped instead of stalling the others.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::error::HubError;
use super::message::OutboundMessage;

/// Default capacity of each observer's outbound queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Default capacity of the hub's inbound event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Opaque identifier of a connected observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(Uuid);

impl ObserverId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ObserverId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ObserverId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

/// A connected observer as seen by the hub: an id and the sending half of
/// its bounded outbound queue.
///
/// The hub keeps no liveness flag. An observer is connected while it is
/// registered; the connection's own cancellation token marks it as
/// disconnecting, after which it unregisters.
#[derive(Debug)]
pub struct Observer {
    id: ObserverId,
    queue: mpsc::Sender<Arc<str>>,
}

impl Observer {
    /// Create an observer with a queue of `capacity` messages.
    ///
    /// The receiver is drained by the observer's writer; it yields `None`
    /// once the hub has let go of the observer.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Arc<str>>) {
        let (queue, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                id: ObserverId::new(),
                queue,
            },
            rx,
        )
    }

    #[must_use]
    pub fn id(&self) -> ObserverId {
        self.id
    }
}

enum HubEvent {
    Register(Observer),
    Unregister(ObserverId),
    Broadcast { message: Arc<str>, retain: bool },
    Direct(ObserverId, Arc<str>),
}

/// The hub event loop. Create with [`Hub::new`] and drive with [`Hub::run`].
pub struct Hub {
    observers: HashMap<ObserverId, Observer>,
    events: mpsc::Receiver<HubEvent>,
    count_tx: watch::Sender<usize>,
    /// Last retained broadcast, replayed to new observers.
    retained: Option<Arc<str>>,
}

/// Cloneable handle for sending to the hub.
#[derive(Clone)]
pub struct HubHandle {
    events: mpsc::Sender<HubEvent>,
    count_rx: watch::Receiver<usize>,
}

impl Hub {
    /// Create a hub whose inbound event channel holds `event_capacity`
    /// pending events.
    #[must_use]
    pub fn new(event_capacity: usize) -> (Self, HubHandle) {
        let (events_tx, events) = mpsc::channel(event_capacity.max(1));
        let (count_tx, count_rx) = watch::channel(0);

        let hub = Self {
            observers: HashMap::new(),
            events,
            count_tx,
            retained: None,
        };
        let handle = HubHandle {
            events: events_tx,
            count_rx,
        };
        (hub, handle)
    }

    /// Process events until cancelled or every handle is dropped.
    ///
    /// Dropping the hub closes all remaining observer queues.
    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::debug!("Hub started");
        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => break,

                event = self.events.recv() => match event {
                    Some(event) => self.handle(event),
                    None => break,
                },
            }
        }
        tracing::info!(observers = self.observers.len(), "Hub stopped");
    }

    fn handle(&mut self, event: HubEvent) {
        match event {
            HubEvent::Register(observer) => {
                let id = observer.id;
                self.observers.insert(id, observer);
                tracing::info!(observer = %id, total = self.observers.len(), "Observer registered");
                if let Some(message) = self.retained.clone() {
                    self.deliver(id, message);
                }
            }
            HubEvent::Unregister(id) => {
                if self.observers.remove(&id).is_some() {
                    tracing::info!(observer = %id, total = self.observers.len(), "Observer unregistered");
                }
            }
            HubEvent::Broadcast { message, retain } => {
                let ids: Vec<ObserverId> = self.observers.keys().copied().collect();
                for id in ids {
                    self.deliver(id, Arc::clone(&message));
                }
                if retain {
                    self.retained = Some(message);
                }
            }
            HubEvent::Direct(id, message) => self.deliver(id, message),
        }
        self.count_tx.send_replace(self.observers.len());
    }

    /// Enqueue without waiting. A full or closed queue drops the observer.
    fn deliver(&mut self, id: ObserverId, message: Arc<str>) {
        let Some(observer) = self.observers.get(&id) else {
            return;
        };
        match observer.queue.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.observers.remove(&id);
                tracing::warn!(observer = %id, "Observer queue full, dropping unresponsive observer");
            }
            Err(TrySendError::Closed(_)) => {
                self.observers.remove(&id);
                tracing::debug!(observer = %id, "Observer queue closed, removing observer");
            }
        }
    }
}

impl HubHandle {
    /// Add an observer to the broadcast set.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] if the hub has stopped.
    pub async fn register(&self, observer: Observer) -> Result<(), HubError> {
        self.send(HubEvent::Register(observer)).await
    }

    /// Remove an observer and close its queue. Unknown ids are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] if the hub has stopped.
    pub async fn unregister(&self, id: ObserverId) -> Result<(), HubError> {
        self.send(HubEvent::Unregister(id)).await
    }

    /// Send a message to every registered observer.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be encoded or the hub has stopped.
    pub async fn broadcast(&self, message: &OutboundMessage) -> Result<(), HubError> {
        let message = Arc::from(message.to_json()?);
        self.send(HubEvent::Broadcast {
            message,
            retain: false,
        })
        .await
    }

    /// Broadcast a message and keep it as the latest snapshot, which the hub
    /// replays to each observer that registers later.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be encoded or the hub has stopped.
    pub async fn publish(&self, message: &OutboundMessage) -> Result<(), HubError> {
        let message = Arc::from(message.to_json()?);
        self.send(HubEvent::Broadcast {
            message,
            retain: true,
        })
        .await
    }

    /// Send a message to a single observer.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be encoded or the hub has stopped.
    pub async fn send_to(&self, id: ObserverId, message: &OutboundMessage) -> Result<(), HubError> {
        let message = Arc::from(message.to_json()?);
        self.send(HubEvent::Direct(id, message)).await
    }

    /// Number of observers registered as of the last processed event.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        *self.count_rx.borrow()
    }

    /// Subscribe to changes of the observer count.
    #[must_use]
    pub fn observer_watch(&self) -> watch::Receiver<usize> {
        self.count_rx.clone()
    }

    async fn send(&self, event: HubEvent) -> Result<(), HubError> {
        self.events.send(event).await.map_err(|_| HubError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::TraceStatus;

    fn text(message: &OutboundMessage) -> Arc<str> {
        Arc::from(message.to_json().unwrap())
    }

    #[test]
    fn test_broadcast_reaches_all_observers() {
        let (mut hub, _handle) = Hub::new(8);
        let (a, mut a_rx) = Observer::new(4);
        let (b, mut b_rx) = Observer::new(4);
        hub.handle(HubEvent::Register(a));
        hub.handle(HubEvent::Register(b));

        let message = text(&OutboundMessage::status(TraceStatus::Started));
        hub.handle(HubEvent::Broadcast {
            message: Arc::clone(&message),
            retain: false,
        });

        assert_eq!(a_rx.try_recv().unwrap(), message);
        assert_eq!(b_rx.try_recv().unwrap(), message);
        assert_eq!(*hub.count_tx.borrow(), 2);
    }

    #[test]
    fn test_full_queue_drops_only_that_observer() {
        let (mut hub, _handle) = Hub::new(8);
        let (slow, mut slow_rx) = Observer::new(1);
        let (fast, mut fast_rx) = Observer::new(8);
        let slow_id = slow.id();
        let fast_id = fast.id();
        hub.handle(HubEvent::Register(slow));
        hub.handle(HubEvent::Register(fast));

        for n in 0..3 {
            hub.handle(HubEvent::Broadcast {
                message: Arc::from(format!("m{n}")),
                retain: false,
            });
        }

        assert!(!hub.observers.contains_key(&slow_id));
        assert!(hub.observers.contains_key(&fast_id));
        assert_eq!(*hub.count_tx.borrow(), 1);

        // The slow observer keeps what it had queued, then sees its queue closed.
        assert_eq!(&*slow_rx.try_recv().unwrap(), "m0");
        assert!(matches!(
            slow_rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));

        for n in 0..3 {
            assert_eq!(&*fast_rx.try_recv().unwrap(), format!("m{n}").as_str());
        }
    }

    #[test]
    fn test_unregister_closes_queue() {
        let (mut hub, _handle) = Hub::new(8);
        let (observer, mut rx) = Observer::new(4);
        let id = observer.id();
        hub.handle(HubEvent::Register(observer));
        hub.handle(HubEvent::Unregister(id));

        assert!(hub.observers.is_empty());
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));

        // Unknown ids are ignored.
        hub.handle(HubEvent::Unregister(ObserverId::new()));
    }

    #[test]
    fn test_direct_message_reaches_one_observer() {
        let (mut hub, _handle) = Hub::new(8);
        let (a, mut a_rx) = Observer::new(4);
        let (b, mut b_rx) = Observer::new(4);
        let a_id = a.id();
        hub.handle(HubEvent::Register(a));
        hub.handle(HubEvent::Register(b));

        hub.handle(HubEvent::Direct(a_id, Arc::from("only-a")));

        assert_eq!(&*a_rx.try_recv().unwrap(), "only-a");
        assert!(b_rx.try_recv().is_err());
    }

    #[test]
    fn test_retained_message_replayed_on_register() {
        let (mut hub, _handle) = Hub::new(8);
        hub.handle(HubEvent::Broadcast {
            message: Arc::from("snapshot"),
            retain: true,
        });
        hub.handle(HubEvent::Broadcast {
            message: Arc::from("transient"),
            retain: false,
        });

        let (late, mut late_rx) = Observer::new(4);
        hub.handle(HubEvent::Register(late));

        assert_eq!(&*late_rx.try_recv().unwrap(), "snapshot");
        assert!(late_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_handle_round_trip() {
        let (hub, handle) = Hub::new(8);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(hub.run(cancel.clone()));

        let (observer, mut rx) = Observer::new(4);
        let id = observer.id();
        handle.register(observer).await.unwrap();
        handle
            .send_to(id, &OutboundMessage::status(TraceStatus::Stopped))
            .await
            .unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(&*received, r#"{"command":"trace","data":"stopped"}"#);

        let mut count = handle.observer_watch();
        count.wait_for(|&n| n == 1).await.unwrap();
        assert_eq!(handle.observer_count(), 1);

        cancel.cancel();
        task.await.unwrap();

        assert!(rx.recv().await.is_none());
        assert!(matches!(
            handle.unregister(id).await,
            Err(HubError::Closed)
        ));
    }
}
