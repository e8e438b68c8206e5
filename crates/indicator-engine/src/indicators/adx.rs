use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time_series::{Bucket, Candle, Timeframe};
use tracing::warn;

use super::{
    continuity, wilder, Continuity, IndicatorCalculator, IndicatorKind, IndicatorPoint,
    IndicatorState, IndicatorUpdate,
};

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Warm-up stage of an [`AdxState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdxPhase {
    /// Summing TR and directional movement for the first `period` moves
    SeedingSmoothers,
    /// Averaging DX for the next `period` moves
    SeedingDx,
    Initialized,
}

/// Accumulated ADX state after the last folded confirmed candle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdxState {
    pub timestamp: Option<Bucket>,
    pub period: usize,
    pub timeframe: Timeframe,
    pub last_high: Option<Decimal>,
    pub last_low: Option<Decimal>,
    pub last_close: Option<Decimal>,
    pub seed_count: usize,
    pub seed_tr_sum: Decimal,
    pub seed_plus_dm_sum: Decimal,
    pub seed_minus_dm_sum: Decimal,
    pub atr: Option<Decimal>,
    pub plus_dm: Option<Decimal>,
    pub minus_dm: Option<Decimal>,
    pub dx_seed_count: usize,
    pub dx_seed_sum: Decimal,
    pub adx: Option<Decimal>,
    pub initialized: bool,
}

impl AdxState {
    pub fn empty(period: usize, timeframe: Timeframe) -> Self {
        Self {
            timestamp: None,
            period,
            timeframe,
            last_high: None,
            last_low: None,
            last_close: None,
            seed_count: 0,
            seed_tr_sum: Decimal::ZERO,
            seed_plus_dm_sum: Decimal::ZERO,
            seed_minus_dm_sum: Decimal::ZERO,
            atr: None,
            plus_dm: None,
            minus_dm: None,
            dx_seed_count: 0,
            dx_seed_sum: Decimal::ZERO,
            adx: None,
            initialized: false,
        }
    }

    pub fn phase(&self) -> AdxPhase {
        match (self.atr, self.initialized) {
            (None, _) => AdxPhase::SeedingSmoothers,
            (Some(_), false) => AdxPhase::SeedingDx,
            (Some(_), true) => AdxPhase::Initialized,
        }
    }

    fn smoothers_seeded(&self) -> bool {
        self.atr.is_some() && self.plus_dm.is_some() && self.minus_dm.is_some()
    }

    fn has_last_bar(&self) -> bool {
        self.last_high.is_some() && self.last_low.is_some() && self.last_close.is_some()
    }
}

impl IndicatorState for AdxState {
    fn timestamp(&self) -> Option<Bucket> {
        self.timestamp
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

/// ADX emitted for one confirmed bucket, with the DI/DX of that bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdxPoint {
    pub bucket: Bucket,
    pub adx: Decimal,
    pub plus_di: Decimal,
    pub minus_di: Decimal,
    pub dx: Decimal,
}

impl IndicatorPoint for AdxPoint {
    fn bucket(&self) -> Bucket {
        self.bucket
    }

    fn value(&self) -> Decimal {
        self.adx
    }
}

/// Directional readings of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Directional {
    plus_di: Decimal,
    minus_di: Decimal,
    dx: Decimal,
}

impl Directional {
    fn from_smoothed(atr: Decimal, plus_dm: Decimal, minus_dm: Decimal) -> Self {
        let (plus_di, minus_di) = if atr.is_zero() {
            (Decimal::ZERO, Decimal::ZERO)
        } else {
            (HUNDRED * plus_dm / atr, HUNDRED * minus_dm / atr)
        };
        let sum = plus_di + minus_di;
        let dx = if sum.is_zero() {
            Decimal::ZERO
        } else {
            HUNDRED * (plus_di - minus_di).abs() / sum
        };
        Self {
            plus_di,
            minus_di,
            dx,
        }
    }
}

/// Raw `+DM`/`-DM` between two bars. At most one side is non-zero.
fn directional_movement(
    high: Decimal,
    low: Decimal,
    prev_high: Decimal,
    prev_low: Decimal,
) -> (Decimal, Decimal) {
    let up = high - prev_high;
    let down = prev_low - low;
    let plus = if up > down && up > Decimal::ZERO {
        up
    } else {
        Decimal::ZERO
    };
    let minus = if down > up && down > Decimal::ZERO {
        down
    } else {
        Decimal::ZERO
    };
    (plus, minus)
}

/// Average Directional Index (Wilder).
///
/// Warm-up runs in two stages: `period` moves seed ATR and smoothed
/// directional movement from plain sums, then `period` further moves seed ADX
/// as the mean DX. The first point is emitted on candle `2 * period + 1`.
#[derive(Debug, Clone)]
pub struct Adx {
    period: usize,
    timeframe: Timeframe,
}

impl Adx {
    /// Create a new ADX calculator. A zero period is treated as one.
    pub fn new(period: usize, timeframe: Timeframe) -> Self {
        Self {
            period: period.max(1),
            timeframe,
        }
    }

    /// Applies one bar to `state` without any bucket bookkeeping. Returns the
    /// new state and, once initialized, the emitted ADX with its DI/DX.
    fn advance(&self, state: &AdxState, candle: &Candle) -> (AdxState, Option<(Decimal, Directional)>) {
        let mut next = state.clone();
        next.last_high = Some(candle.high);
        next.last_low = Some(candle.low);
        next.last_close = Some(candle.close);

        let (Some(prev_high), Some(prev_low), Some(prev_close)) =
            (state.last_high, state.last_low, state.last_close)
        else {
            return (next, None);
        };

        let tr = candle.true_range(prev_close);
        let (plus_dm, minus_dm) = directional_movement(candle.high, candle.low, prev_high, prev_low);
        let period = Decimal::from(self.period);

        let (Some(atr), Some(smoothed_plus), Some(smoothed_minus)) =
            (state.atr, state.plus_dm, state.minus_dm)
        else {
            next.seed_count += 1;
            next.seed_tr_sum += tr;
            next.seed_plus_dm_sum += plus_dm;
            next.seed_minus_dm_sum += minus_dm;
            if next.seed_count >= self.period {
                next.atr = Some(next.seed_tr_sum / period);
                next.plus_dm = Some(next.seed_plus_dm_sum / period);
                next.minus_dm = Some(next.seed_minus_dm_sum / period);
            }
            return (next, None);
        };

        let atr = wilder(atr, tr, period);
        let smoothed_plus = wilder(smoothed_plus, plus_dm, period);
        let smoothed_minus = wilder(smoothed_minus, minus_dm, period);
        next.atr = Some(atr);
        next.plus_dm = Some(smoothed_plus);
        next.minus_dm = Some(smoothed_minus);

        let reading = Directional::from_smoothed(atr, smoothed_plus, smoothed_minus);

        match state.adx {
            Some(adx) if state.initialized => {
                let adx = wilder(adx, reading.dx, period);
                next.adx = Some(adx);
                (next, Some((adx, reading)))
            }
            _ => {
                next.dx_seed_count += 1;
                next.dx_seed_sum += reading.dx;
                if next.dx_seed_count < self.period {
                    return (next, None);
                }
                let adx = next.dx_seed_sum / period;
                next.adx = Some(adx);
                next.initialized = true;
                (next, Some((adx, reading)))
            }
        }
    }
}

impl IndicatorCalculator for Adx {
    type State = AdxState;
    type Point = AdxPoint;

    fn kind(&self) -> IndicatorKind {
        IndicatorKind::Adx
    }

    fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    fn period(&self) -> usize {
        self.period
    }

    fn warmup_period(&self) -> usize {
        2 * self.period + 1
    }

    fn empty_state(&self) -> AdxState {
        AdxState::empty(self.period, self.timeframe)
    }

    fn preview(&self, state: &AdxState, candle: &Candle) -> Option<Decimal> {
        if !state.initialized || !state.has_last_bar() || !state.smoothers_seeded() {
            return None;
        }
        self.advance(state, candle).1.map(|(adx, _)| adx)
    }

    fn commit_confirmed(
        &self,
        state: &AdxState,
        bucket: Bucket,
        candle: &Candle,
    ) -> IndicatorUpdate<AdxState, AdxPoint> {
        let base = match continuity(self.timeframe, state.timestamp, bucket) {
            Continuity::Gap => {
                warn!(
                    indicator = %self.name(),
                    last = ?state.timestamp,
                    %bucket,
                    "confirmed candle out of sequence, resetting state"
                );
                self.empty_state()
            }
            Continuity::First | Continuity::Next => state.clone(),
        };

        let (mut next, emitted) = self.advance(&base, candle);
        next.timestamp = Some(bucket);

        IndicatorUpdate {
            point: emitted.map(|(adx, reading)| AdxPoint {
                bucket,
                adx,
                plus_di: reading.plus_di,
                minus_di: reading.minus_di,
                dx: reading.dx,
            }),
            state: next,
        }
    }
}
