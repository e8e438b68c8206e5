use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use time_series::{Bucket, Candle, Timeframe};

/// Sequence generator shared by every publisher in the process.
static GLOBAL_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// What happened to the candle buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandleEventKind {
    /// A single candle arrived from the live feed.
    Tick,
    /// The buffers were bulk-restored from history.
    History,
}

/// Candle event delivered to indicator workers.
///
/// A `Tick` carries the candle and its bucket. A `History` event carries no
/// candle; `bucket` is the last restored bucket, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandleEvent {
    pub kind: CandleEventKind,
    pub instrument: String,
    pub timeframe: Timeframe,
    pub bucket: Option<Bucket>,
    pub candle: Option<Candle>,
    pub sequence: u64,
    pub published_at: DateTime<Utc>,
}

impl CandleEvent {
    pub fn tick(
        instrument: impl Into<String>,
        timeframe: Timeframe,
        bucket: Bucket,
        candle: Candle,
    ) -> Self {
        Self::new(
            CandleEventKind::Tick,
            instrument.into(),
            timeframe,
            Some(bucket),
            Some(candle),
        )
    }

    pub fn history(
        instrument: impl Into<String>,
        timeframe: Timeframe,
        last_bucket: Option<Bucket>,
    ) -> Self {
        Self::new(
            CandleEventKind::History,
            instrument.into(),
            timeframe,
            last_bucket,
            None,
        )
    }

    fn new(
        kind: CandleEventKind,
        instrument: String,
        timeframe: Timeframe,
        bucket: Option<Bucket>,
        candle: Option<Candle>,
    ) -> Self {
        Self {
            kind,
            instrument,
            timeframe,
            bucket,
            candle,
            sequence: GLOBAL_SEQUENCE.fetch_add(1, Ordering::Relaxed),
            published_at: Utc::now(),
        }
    }

    /// Whether the event carries a closed candle.
    pub fn is_confirmed(&self) -> bool {
        self.candle.as_ref().is_some_and(Candle::is_confirmed)
    }

    /// Bucket and candle of a `Tick`, if present.
    pub fn tick_payload(&self) -> Option<(Bucket, &Candle)> {
        match (self.kind, self.bucket, self.candle.as_ref()) {
            (CandleEventKind::Tick, Some(bucket), Some(candle)) => Some((bucket, candle)),
            _ => None,
        }
    }
}
