use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time_series::{Bucket, Candle, Timeframe};

pub mod adx;
pub mod rsi;

/// Which indicator a calculator implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IndicatorKind {
    Rsi,
    Adx,
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IndicatorKind::Rsi => "RSI",
            IndicatorKind::Adx => "ADX",
        })
    }
}

/// Immutable snapshot of an indicator's accumulated state.
pub trait IndicatorState: Clone + fmt::Debug + Send + Sync + 'static {
    /// Last confirmed bucket folded into this state.
    fn timestamp(&self) -> Option<Bucket>;
    /// Whether seeding is complete and points are being emitted.
    fn is_initialized(&self) -> bool;
}

/// Value emitted for one confirmed bucket.
pub trait IndicatorPoint: Clone + fmt::Debug + Send + Sync + 'static {
    fn bucket(&self) -> Bucket;
    /// Headline value of the point.
    fn value(&self) -> Decimal;
}

/// Result of folding one confirmed candle.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorUpdate<S, P> {
    pub point: Option<P>,
    pub state: S,
}

/// Pure state transitions for one indicator.
///
/// Neither method mutates its input state, so a caller can preview against
/// the same state it later commits to.
pub trait IndicatorCalculator: Send + Sync + 'static {
    type State: IndicatorState;
    type Point: IndicatorPoint;

    fn kind(&self) -> IndicatorKind;
    fn timeframe(&self) -> Timeframe;
    fn period(&self) -> usize;

    /// Confirmed candles needed from an empty state before the first point.
    fn warmup_period(&self) -> usize;

    fn empty_state(&self) -> Self::State;

    /// Value the next commit would produce if `candle` closed as is.
    fn preview(&self, state: &Self::State, candle: &Candle) -> Option<Decimal>;

    /// Folds a confirmed candle at `bucket` into `state`.
    fn commit_confirmed(
        &self,
        state: &Self::State,
        bucket: Bucket,
        candle: &Candle,
    ) -> IndicatorUpdate<Self::State, Self::Point>;

    fn name(&self) -> String {
        format!("{}{}-{}", self.kind(), self.period(), self.timeframe())
    }
}

/// Folds `entries` in order, skipping unconfirmed candles, and returns the
/// final state with every emitted point.
pub fn fold<C, I>(calculator: &C, state: C::State, entries: I) -> (C::State, Vec<C::Point>)
where
    C: IndicatorCalculator + ?Sized,
    I: IntoIterator<Item = (Bucket, Candle)>,
{
    let mut state = state;
    let mut points = Vec::new();
    for (bucket, candle) in entries {
        if !candle.is_confirmed() {
            continue;
        }
        let update = calculator.commit_confirmed(&state, bucket, &candle);
        state = update.state;
        points.extend(update.point);
    }
    (state, points)
}

/// Wilder smoothing: `(prev * (period - 1) + value) / period`.
#[inline]
pub fn wilder(prev: Decimal, value: Decimal, period: Decimal) -> Decimal {
    (prev * (period - Decimal::ONE) + value) / period
}

/// How a new confirmed bucket relates to the last folded one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Continuity {
    /// Nothing folded yet
    First,
    /// Exactly one bucket after the last folded one
    Next,
    /// Anything else: skipped buckets, a repeat or a step back
    Gap,
}

pub(crate) fn continuity(timeframe: Timeframe, last: Option<Bucket>, bucket: Bucket) -> Continuity {
    match last {
        None => Continuity::First,
        Some(last) if timeframe.next_bucket(last) == bucket => Continuity::Next,
        Some(_) => Continuity::Gap,
    }
}

pub mod prelude {
    pub use super::adx::{Adx, AdxPhase, AdxPoint, AdxState};
    pub use super::rsi::{Rsi, RsiPhase, RsiPoint, RsiState};
    pub use super::{
        fold, wilder, IndicatorCalculator, IndicatorKind, IndicatorPoint, IndicatorState,
        IndicatorUpdate,
    };
}
