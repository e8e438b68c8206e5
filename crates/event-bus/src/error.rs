use std::time::Duration;

use crossbeam_channel::{
    RecvError, RecvTimeoutError, SendError, SendTimeoutError, TryRecvError, TrySendError,
};
use thiserror::Error;

/// Errors surfaced by the candle event channels.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventBusError {
    #[error("channel is full")]
    Full,

    #[error("channel disconnected")]
    Disconnected,

    #[error("publish timed out after {0:?}")]
    PublishTimeout(Duration),

    #[error("no event available")]
    Empty,

    #[error("receive timed out")]
    RecvTimeout,

    #[error("unknown subscription: {0}")]
    UnknownSubscription(u64),
}

impl EventBusError {
    pub fn from_send_error<T>(_err: SendError<T>) -> Self {
        EventBusError::Disconnected
    }

    pub fn from_try_send_error<T>(err: TrySendError<T>) -> Self {
        match err {
            TrySendError::Full(_) => EventBusError::Full,
            TrySendError::Disconnected(_) => EventBusError::Disconnected,
        }
    }

    pub fn from_send_timeout_error<T>(err: SendTimeoutError<T>, timeout: Duration) -> Self {
        match err {
            SendTimeoutError::Timeout(_) => EventBusError::PublishTimeout(timeout),
            SendTimeoutError::Disconnected(_) => EventBusError::Disconnected,
        }
    }

    pub fn from_recv_error(_err: RecvError) -> Self {
        EventBusError::Disconnected
    }

    pub fn from_recv_timeout(err: RecvTimeoutError) -> Self {
        match err {
            RecvTimeoutError::Timeout => EventBusError::RecvTimeout,
            RecvTimeoutError::Disconnected => EventBusError::Disconnected,
        }
    }

    pub fn from_try_recv_error(err: TryRecvError) -> Self {
        match err {
            TryRecvError::Empty => EventBusError::Empty,
            TryRecvError::Disconnected => EventBusError::Disconnected,
        }
    }

    /// Whether the event was lost to backpressure rather than a closed channel.
    pub fn is_backpressure(&self) -> bool {
        matches!(self, EventBusError::Full | EventBusError::PublishTimeout(_))
    }
}

/// Result alias for event bus operations.
pub type EventBusResult<T> = Result<T, EventBusError>;
