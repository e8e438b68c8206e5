use std::fmt;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::error::EventBusError;

/// Result alias for publishing events to a channel.
pub type EventPublishResult = Result<(), EventBusError>;

/// What `publish` does when a worker queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PublishMode {
    /// Wait for the worker to make room.
    Blocking,
    /// Fail with `EventBusError::Full`; the caller drops the event.
    #[default]
    Try,
    /// Wait for room, at most this long.
    Timeout(Duration),
}

/// Creates a bounded channel pair. A zero capacity is treated as one so that
/// the channel never degrades into a rendezvous channel.
pub fn channel<T: Send + 'static>(capacity: usize) -> (EventSender<T>, EventReceiver<T>) {
    let (tx, rx) = bounded(capacity.max(1));
    (EventSender::new(tx), EventReceiver::new(rx))
}

/// Producer half of a worker queue.
#[derive(Clone)]
pub struct EventSender<T: Send + 'static> {
    inner: Sender<T>,
}

impl<T: Send + 'static> EventSender<T> {
    fn new(inner: Sender<T>) -> Self {
        Self { inner }
    }

    /// Enqueues `event`, handling a full queue per `mode`.
    pub fn publish(&self, event: T, mode: PublishMode) -> EventPublishResult {
        match mode {
            PublishMode::Blocking => self
                .inner
                .send(event)
                .map_err(EventBusError::from_send_error),
            PublishMode::Try => self
                .inner
                .try_send(event)
                .map_err(EventBusError::from_try_send_error),
            PublishMode::Timeout(timeout) => self
                .inner
                .send_timeout(event, timeout)
                .map_err(|err| EventBusError::from_send_timeout_error(err, timeout)),
        }
    }

    /// Attempts to publish without blocking.
    pub fn try_publish(&self, event: T) -> EventPublishResult {
        self.publish(event, PublishMode::Try)
    }

    /// Events currently queued.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.inner.capacity()
    }
}

impl<T: Send + 'static> fmt::Debug for EventSender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSender")
            .field("queued", &self.inner.len())
            .finish_non_exhaustive()
    }
}

/// Consumer half of a worker queue.
#[derive(Clone)]
pub struct EventReceiver<T: Send + 'static> {
    inner: Receiver<T>,
}

impl<T: Send + 'static> EventReceiver<T> {
    fn new(inner: Receiver<T>) -> Self {
        Self { inner }
    }

    /// Blocks until an event arrives or every sender is gone.
    pub fn recv(&self) -> Result<T, EventBusError> {
        self.inner.recv().map_err(EventBusError::from_recv_error)
    }

    /// Like [`recv`](Self::recv) but gives up after `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<T, EventBusError> {
        self.inner
            .recv_timeout(timeout)
            .map_err(EventBusError::from_recv_timeout)
    }

    /// Takes a queued event, if any.
    pub fn try_recv(&self) -> Result<T, EventBusError> {
        self.inner
            .try_recv()
            .map_err(EventBusError::from_try_recv_error)
    }

    /// Events currently queued.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl<T: Send + 'static> fmt::Debug for EventReceiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventReceiver")
            .field("queued", &self.inner.len())
            .finish_non_exhaustive()
    }
}
