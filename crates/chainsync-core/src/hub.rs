//! Subscription hub: per-event-type and wildcard publish/subscribe.
//!
//! Every subscriber owns a bounded queue. `publish` only enqueues, so a slow
//! consumer can never stall the sync loop: when its queue is full the event
//! is dropped for that subscriber alone and counted.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::types::{BlockchainEvent, EventType};

/// What a subscriber listens to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Every event, regardless of type.
    All,
    /// Events of one classified type.
    Type(EventType),
}

impl Topic {
    /// Parse `"ALL"` (or `"*"`) as the wildcard, anything else as an event type.
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("all") || s == "*" {
            Self::All
        } else {
            Self::Type(EventType::from(s))
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("ALL"),
            Self::Type(t) => write!(f, "{t}"),
        }
    }
}

impl From<EventType> for Topic {
    fn from(t: EventType) -> Self {
        Self::Type(t)
    }
}

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<Arc<BlockchainEvent>>,
    dropped: Arc<AtomicU64>,
}

#[derive(Default)]
struct Registry {
    by_type: HashMap<String, Vec<Subscriber>>,
    all: Vec<Subscriber>,
}

impl Registry {
    fn remove(&mut self, topic: &Topic, id: u64) {
        match topic {
            Topic::All => self.all.retain(|s| s.id != id),
            Topic::Type(t) => {
                if let Some(subs) = self.by_type.get_mut(t.as_str()) {
                    subs.retain(|s| s.id != id);
                    if subs.is_empty() {
                        self.by_type.remove(t.as_str());
                    }
                }
            }
        }
    }
}

struct HubInner {
    registry: Mutex<Registry>,
    next_id: AtomicU64,
    queue_capacity: usize,
    published: AtomicU64,
}

impl HubInner {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Cheaply cloneable handle to a shared subscription registry.
#[derive(Clone)]
pub struct SubscriptionHub {
    inner: Arc<HubInner>,
}

impl SubscriptionHub {
    /// Create a hub whose subscribers each get a queue of `queue_capacity` events.
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                registry: Mutex::new(Registry::default()),
                next_id: AtomicU64::new(1),
                queue_capacity: queue_capacity.max(1),
                published: AtomicU64::new(0),
            }),
        }
    }

    fn register(
        &self,
        topic: &Topic,
        capacity: usize,
    ) -> (u64, mpsc::Receiver<Arc<BlockchainEvent>>, Arc<AtomicU64>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let dropped = Arc::new(AtomicU64::new(0));
        let sub = Subscriber {
            id,
            tx,
            dropped: dropped.clone(),
        };
        let mut reg = self.inner.registry();
        match topic {
            Topic::All => reg.all.push(sub),
            Topic::Type(t) => reg.by_type.entry(t.as_str().to_string()).or_default().push(sub),
        }
        (id, rx, dropped)
    }

    /// Subscribe with a receiving channel. Dropping the `Subscription` unsubscribes.
    pub fn subscribe(&self, topic: impl Into<Topic>) -> Subscription {
        self.subscribe_with_capacity(topic, self.inner.queue_capacity)
    }

    /// Like [`subscribe`](Self::subscribe) with a queue of `capacity` events.
    pub fn subscribe_with_capacity(&self, topic: impl Into<Topic>, capacity: usize) -> Subscription {
        let topic = topic.into();
        let (id, rx, dropped) = self.register(&topic, capacity);
        tracing::debug!(id, %topic, capacity, "subscriber registered");
        Subscription {
            id,
            topic,
            rx,
            dropped,
            hub: Arc::downgrade(&self.inner),
        }
    }

    /// Subscribe with a callback run on a dedicated task, in publish order.
    ///
    /// The subscription lives until [`SubscriptionHandle::unsubscribe`] is
    /// called or the hub is dropped; dropping the handle detaches it.
    /// Must be called from within a Tokio runtime.
    pub fn subscribe_with<F>(&self, topic: impl Into<Topic>, mut callback: F) -> SubscriptionHandle
    where
        F: FnMut(Arc<BlockchainEvent>) + Send + 'static,
    {
        let topic = topic.into();
        let (id, mut rx, dropped) = self.register(&topic, self.inner.queue_capacity);
        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                callback(event);
            }
        });
        tracing::debug!(id, %topic, "callback subscriber registered");
        SubscriptionHandle {
            id,
            topic,
            dropped,
            hub: Arc::downgrade(&self.inner),
            task,
        }
    }

    /// Enqueue `event` for its type's subscribers, then the wildcard ones.
    ///
    /// Returns the number of subscribers the event was queued for.
    pub fn publish(&self, event: BlockchainEvent) -> usize {
        let event = Arc::new(event);
        let mut reg = self.inner.registry();
        let Registry { by_type, all } = &mut *reg;

        let mut delivered = 0;
        let mut closed: Vec<(Topic, u64)> = Vec::new();
        let typed = by_type.get(event.event_type.as_str()).map(|v| v.as_slice()).unwrap_or(&[]);
        let groups = [
            (Topic::Type(event.event_type.clone()), typed),
            (Topic::All, all.as_slice()),
        ];
        for (topic, subs) in groups {
            for sub in subs {
                match sub.tx.try_send(event.clone()) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        sub.dropped.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(
                            subscriber = sub.id,
                            %topic,
                            event_id = %event.id,
                            "subscriber queue full, dropping event"
                        );
                    }
                    Err(TrySendError::Closed(_)) => closed.push((topic.clone(), sub.id)),
                }
            }
        }
        for (topic, id) in closed {
            tracing::debug!(id, %topic, "removing closed subscriber");
            reg.remove(&topic, id);
        }
        self.inner.published.fetch_add(1, Ordering::Relaxed);
        delivered
    }

    /// Total number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        let reg = self.inner.registry();
        reg.all.len() + reg.by_type.values().map(Vec::len).sum::<usize>()
    }

    /// Number of events published so far.
    pub fn published(&self) -> u64 {
        self.inner.published.load(Ordering::Relaxed)
    }
}

impl Default for SubscriptionHub {
    fn default() -> Self {
        Self::new(1_024)
    }
}

/// A channel-backed subscription. Unsubscribes on drop.
pub struct Subscription {
    id: u64,
    topic: Topic,
    rx: mpsc::Receiver<Arc<BlockchainEvent>>,
    dropped: Arc<AtomicU64>,
    hub: Weak<HubInner>,
}

impl Subscription {
    /// Wait for the next event; `None` once unsubscribed or the hub is gone.
    pub async fn recv(&mut self) -> Option<Arc<BlockchainEvent>> {
        self.rx.recv().await
    }

    /// Take the next event if one is queued.
    pub fn try_recv(&mut self) -> Option<Arc<BlockchainEvent>> {
        self.rx.try_recv().ok()
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Events dropped because this subscriber's queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.registry().remove(&self.topic, self.id);
        }
    }
}

/// Handle to a callback subscription.
pub struct SubscriptionHandle {
    id: u64,
    topic: Topic,
    dropped: Arc<AtomicU64>,
    hub: Weak<HubInner>,
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Remove the subscription. Events already queued are still delivered,
    /// then the dispatcher task exits; the returned handle resolves then.
    pub fn unsubscribe(self) -> JoinHandle<()> {
        if let Some(hub) = self.hub.upgrade() {
            hub.registry().remove(&self.topic, self.id);
        }
        self.task
    }
}
