//! Live event fan-out
//!
//! Every subscriber owns a bounded queue. `publish` never waits: a subscriber
//! whose queue is full (or whose receiving side is gone) is removed on the
//! spot, which ends its stream, and delivery continues to everyone else.

use futures::Stream;
use parking_lot::Mutex;
use rubrica_core::DomainEvent;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

/// Default per-subscriber queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

#[derive(Default)]
struct Registry {
    next_id: u64,
    subscribers: HashMap<u64, mpsc::Sender<Arc<DomainEvent>>>,
}

/// Event broadcaster
///
/// Cheap to clone; clones share the same subscriber set.
#[derive(Clone)]
pub struct EventBroadcaster {
    registry: Arc<Mutex<Registry>>,
    capacity: usize,
}

impl EventBroadcaster {
    /// Create a broadcaster whose subscribers each buffer up to `capacity`
    /// events
    pub fn new(capacity: usize) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            capacity: capacity.max(1),
        }
    }

    /// Register a new subscriber with an empty queue
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.capacity);

        let id = {
            let mut registry = self.registry.lock();
            registry.next_id += 1;
            let id = registry.next_id;
            registry.subscribers.insert(id, tx);
            id
        };

        debug!(subscriber_id = id, "Event subscriber registered");

        Subscription {
            id,
            rx,
            registry: self.registry.clone(),
        }
    }

    /// Remove a subscriber; unknown ids are ignored
    pub fn unsubscribe(&self, id: u64) {
        if self.registry.lock().subscribers.remove(&id).is_some() {
            debug!(subscriber_id = id, "Event subscriber unregistered");
        }
    }

    /// Deliver `event` to every live subscriber; returns how many received it
    pub fn publish(&self, event: DomainEvent) -> usize {
        let event = Arc::new(event);
        let mut registry = self.registry.lock();
        let mut delivered = 0;

        registry.subscribers.retain(|id, tx| match tx.try_send(event.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!(subscriber_id = *id, "Subscriber queue full, dropping subscriber");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(subscriber_id = *id, "Subscriber gone, removing");
                false
            }
        });

        debug!(event = event.name(), delivered = delivered, "Event published");
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.lock().subscribers.len()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

/// Handle returned by [`EventBroadcaster::subscribe`]
///
/// Yields events in publish order. The stream ends once the subscriber has
/// been dropped by the broadcaster and its queue is drained. Dropping the
/// handle unsubscribes.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<Arc<DomainEvent>>,
    registry: Arc<Mutex<Registry>>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next event, or `None` once the subscriber has been removed
    pub async fn recv(&mut self) -> Option<Arc<DomainEvent>> {
        self.rx.recv().await
    }

    /// Next queued event without waiting
    pub fn try_recv(&mut self) -> Option<Arc<DomainEvent>> {
        self.rx.try_recv().ok()
    }
}

impl Stream for Subscription {
    type Item = Arc<DomainEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.lock().subscribers.remove(&self.id);
    }
}
