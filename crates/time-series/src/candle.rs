use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::Bucket;

/// OHLCV candle for one timeframe bucket.
///
/// `confirmed` marks a closed candle; unconfirmed candles are in-progress
/// snapshots that may still change before the bucket closes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    #[serde(default)]
    pub volume: Decimal,
    #[serde(default = "default_confirmed")]
    pub confirmed: bool,
}

fn default_confirmed() -> bool {
    true
}

impl Candle {
    /// Closed candle.
    pub fn new(open: Decimal, high: Decimal, low: Decimal, close: Decimal, volume: Decimal) -> Self {
        Self {
            open,
            high,
            low,
            close,
            volume,
            confirmed: true,
        }
    }

    /// Same prices, marked as still in progress.
    pub fn unconfirmed(mut self) -> Self {
        self.confirmed = false;
        self
    }

    /// Candle whose every price equals `close`; handy for close-only feeds.
    pub fn flat(close: Decimal) -> Self {
        Self::new(close, close, close, close, Decimal::ZERO)
    }

    #[inline]
    pub fn is_confirmed(&self) -> bool {
        self.confirmed
    }

    /// Wilder's true range against the previous close.
    pub fn true_range(&self, prev_close: Decimal) -> Decimal {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }
}

/// Candle paired with its bucket, the shape candles take on the wire and on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketedCandle {
    pub bucket: Bucket,
    #[serde(flatten)]
    pub candle: Candle,
}

impl BucketedCandle {
    pub fn new(bucket: Bucket, candle: Candle) -> Self {
        Self { bucket, candle }
    }
}

impl From<(Bucket, Candle)> for BucketedCandle {
    fn from((bucket, candle): (Bucket, Candle)) -> Self {
        Self { bucket, candle }
    }
}
