use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use time_series::Timeframe;
use tracing::{debug, info, warn};

use crate::channel::{channel, EventReceiver, EventSender, PublishMode};
use crate::envelope::CandleEvent;
use crate::error::{EventBusError, EventBusResult};

/// Identifier handed out by [`CandleEventBus::subscribe`].
pub type SubscriptionId = u64;

/// Outcome of one [`CandleEventBus::publish`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub dropped: usize,
}

/// Per-subscriber counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberStats {
    pub id: SubscriptionId,
    pub name: String,
    pub timeframe: Option<Timeframe>,
    pub queued: usize,
    pub dropped: u64,
}

/// Receiving end of a subscription.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub receiver: EventReceiver<CandleEvent>,
}

struct Subscriber {
    id: SubscriptionId,
    name: String,
    timeframe: Option<Timeframe>,
    sender: EventSender<CandleEvent>,
    dropped: AtomicU64,
}

impl Subscriber {
    fn accepts(&self, event: &CandleEvent) -> bool {
        self.timeframe.map_or(true, |tf| tf == event.timeframe)
    }
}

/// Builder configuring queue capacity and publish mode.
#[derive(Debug, Clone)]
pub struct CandleEventBusBuilder {
    queue_capacity: usize,
    publish_mode: PublishMode,
}

impl Default for CandleEventBusBuilder {
    fn default() -> Self {
        Self {
            queue_capacity: 4_096,
            publish_mode: PublishMode::Try,
        }
    }
}

impl CandleEventBusBuilder {
    /// Default per-subscriber queue capacity.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// How publishers treat a full subscriber queue. `Try` drops the event.
    pub fn publish_mode(mut self, mode: PublishMode) -> Self {
        self.publish_mode = mode;
        self
    }

    pub fn build(self) -> CandleEventBus {
        CandleEventBus {
            inner: Arc::new(BusInner {
                subscribers: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(1),
                published: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
                queue_capacity: self.queue_capacity,
                publish_mode: self.publish_mode,
            }),
        }
    }
}

struct BusInner {
    subscribers: RwLock<Vec<Arc<Subscriber>>>,
    next_id: AtomicU64,
    published: AtomicU64,
    dropped: AtomicU64,
    queue_capacity: usize,
    publish_mode: PublishMode,
}

/// Fan-out of candle events to any number of bounded subscriber queues.
///
/// Cloning the bus is cheap and every clone shares the same subscribers.
#[derive(Clone)]
pub struct CandleEventBus {
    inner: Arc<BusInner>,
}

impl Default for CandleEventBus {
    fn default() -> Self {
        CandleEventBusBuilder::default().build()
    }
}

impl CandleEventBus {
    pub fn builder() -> CandleEventBusBuilder {
        CandleEventBusBuilder::default()
    }

    /// Subscribes with the bus's default queue capacity. `timeframe = None`
    /// receives every timeframe.
    pub fn subscribe(&self, name: impl Into<String>, timeframe: Option<Timeframe>) -> Subscription {
        self.subscribe_with_capacity(name, timeframe, self.inner.queue_capacity)
    }

    pub fn subscribe_with_capacity(
        &self,
        name: impl Into<String>,
        timeframe: Option<Timeframe>,
        capacity: usize,
    ) -> Subscription {
        let (sender, receiver) = channel(capacity);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let subscriber = Arc::new(Subscriber {
            id,
            name: name.into(),
            timeframe,
            sender,
            dropped: AtomicU64::new(0),
        });

        info!(
            subscription = id,
            subscriber = %subscriber.name,
            timeframe = ?timeframe,
            capacity,
            "📡 Subscribed to candle events"
        );
        self.inner.subscribers.write().push(subscriber);
        Subscription { id, receiver }
    }

    /// Removes a subscriber. Its receiver drains what is already queued and
    /// then reports [`EventBusError::Disconnected`].
    pub fn unsubscribe(&self, id: SubscriptionId) -> EventBusResult<()> {
        let mut subscribers = self.inner.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        if subscribers.len() == before {
            return Err(EventBusError::UnknownSubscription(id));
        }
        debug!(subscription = id, "unsubscribed");
        Ok(())
    }

    /// Delivers `event` to every matching subscriber using the configured
    /// publish mode. Events that do not fit are dropped and counted; closed
    /// subscribers are removed.
    pub fn publish(&self, event: CandleEvent) -> PublishReport {
        let targets: Vec<Arc<Subscriber>> = self
            .inner
            .subscribers
            .read()
            .iter()
            .filter(|s| s.accepts(&event))
            .cloned()
            .collect();

        self.inner.published.fetch_add(1, Ordering::Relaxed);
        let mut report = PublishReport::default();
        let mut closed = Vec::new();

        for subscriber in &targets {
            match subscriber.sender.publish(event.clone(), self.inner.publish_mode) {
                Ok(()) => report.delivered += 1,
                Err(err) if err.is_backpressure() => {
                    report.dropped += 1;
                    subscriber.dropped.fetch_add(1, Ordering::Relaxed);
                    self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        subscriber = %subscriber.name,
                        kind = ?event.kind,
                        timeframe = %event.timeframe,
                        bucket = ?event.bucket,
                        sequence = event.sequence,
                        "⚠️ Subscriber queue full, candle event dropped"
                    );
                }
                Err(_) => closed.push(subscriber.id),
            }
        }

        if !closed.is_empty() {
            self.inner
                .subscribers
                .write()
                .retain(|s| !closed.contains(&s.id));
            debug!(closed = closed.len(), "removed disconnected subscribers");
        }
        report
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().len()
    }

    /// Events handed to [`publish`](Self::publish) so far.
    pub fn published(&self) -> u64 {
        self.inner.published.load(Ordering::Relaxed)
    }

    /// Deliveries lost to full queues, across all subscribers.
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> Vec<SubscriberStats> {
        self.inner
            .subscribers
            .read()
            .iter()
            .map(|s| SubscriberStats {
                id: s.id,
                name: s.name.clone(),
                timeframe: s.timeframe,
                queued: s.sender.len(),
                dropped: s.dropped.load(Ordering::Relaxed),
            })
            .collect()
    }
}

impl fmt::Debug for CandleEventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CandleEventBus")
            .field("subscribers", &self.subscriber_count())
            .field("published", &self.published())
            .field("dropped", &self.dropped())
            .field("publish_mode", &self.inner.publish_mode)
            .finish()
    }
}
