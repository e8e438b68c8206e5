//! # Event Bus
//!
//! Fans candle events out to indicator workers over bounded crossbeam
//! channels. Delivery is deliberately lossy: a subscriber whose queue is full
//! misses the event, and the consumer recovers through buffer reconciliation
//! rather than through delivery guarantees.

pub mod bus;
pub mod channel;
pub mod envelope;
pub mod error;

pub use bus::{
    CandleEventBus, CandleEventBusBuilder, PublishReport, SubscriberStats, Subscription,
    SubscriptionId,
};
pub use channel::{channel, EventPublishResult, EventReceiver, EventSender, PublishMode};
pub use envelope::{CandleEvent, CandleEventKind};
pub use error::{EventBusError, EventBusResult};
