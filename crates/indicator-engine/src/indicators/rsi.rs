use std::collections::VecDeque;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time_series::{Bucket, Candle, Timeframe};
use tracing::warn;

use super::{
    continuity, wilder, Continuity, IndicatorCalculator, IndicatorKind, IndicatorPoint,
    IndicatorState, IndicatorUpdate,
};

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Upper band; falling back through it from above flags a pump.
pub const PUMP_LEVEL: Decimal = Decimal::from_parts(70, 0, 0, false, 0);
/// Lower band; climbing back through it from below flags a dump.
pub const DUMP_LEVEL: Decimal = Decimal::from_parts(30, 0, 0, false, 0);
/// Emitted RSI values kept in [`RsiState::recent`].
pub const RECENT_POINTS: usize = 10;

// ============================================================================
// State
// ============================================================================

/// Warm-up stage of an [`RsiState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsiPhase {
    Seeding,
    Initialized,
}

/// Accumulated RSI state after the last folded confirmed candle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RsiState {
    pub timestamp: Option<Bucket>,
    pub period: usize,
    pub timeframe: Timeframe,
    pub seed_count: usize,
    pub seed_gain_sum: Decimal,
    pub seed_loss_sum: Decimal,
    pub avg_gain: Decimal,
    pub avg_loss: Decimal,
    pub last_close: Option<Decimal>,
    pub initialized: bool,
    /// Last emitted values, oldest first, at most [`RECENT_POINTS`].
    #[serde(default)]
    pub recent: VecDeque<(Bucket, Decimal)>,
}

impl RsiState {
    pub fn empty(period: usize, timeframe: Timeframe) -> Self {
        Self {
            timestamp: None,
            period,
            timeframe,
            seed_count: 0,
            seed_gain_sum: Decimal::ZERO,
            seed_loss_sum: Decimal::ZERO,
            avg_gain: Decimal::ZERO,
            avg_loss: Decimal::ZERO,
            last_close: None,
            initialized: false,
            recent: VecDeque::with_capacity(RECENT_POINTS),
        }
    }

    pub fn phase(&self) -> RsiPhase {
        if self.initialized {
            RsiPhase::Initialized
        } else {
            RsiPhase::Seeding
        }
    }

    /// RSI implied by the current averages, once seeded.
    pub fn rsi(&self) -> Option<Decimal> {
        self.initialized
            .then(|| rsi_from_averages(self.avg_gain, self.avg_loss))
    }

    /// Most recently emitted RSI value.
    pub fn last_rsi(&self) -> Option<Decimal> {
        self.recent.back().map(|(_, rsi)| *rsi)
    }

    fn remember(&mut self, bucket: Bucket, rsi: Decimal) {
        if self.recent.len() == RECENT_POINTS {
            self.recent.pop_front();
        }
        self.recent.push_back((bucket, rsi));
    }
}

impl IndicatorState for RsiState {
    fn timestamp(&self) -> Option<Bucket> {
        self.timestamp
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

/// RSI emitted for one confirmed bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RsiPoint {
    pub bucket: Bucket,
    pub rsi: Decimal,
    pub timeframe: Timeframe,
    /// RSI dropped from above [`PUMP_LEVEL`] to at or below it.
    #[serde(default)]
    pub pump: bool,
    /// RSI rose from below [`DUMP_LEVEL`] to at or above it.
    #[serde(default)]
    pub dump: bool,
}

impl RsiPoint {
    /// Builds the point for `rsi`, flagging band crossings against the
    /// previous emitted value.
    pub fn new(bucket: Bucket, rsi: Decimal, timeframe: Timeframe, previous: Option<Decimal>) -> Self {
        let (pump, dump) = match previous {
            Some(prev) => (
                prev > PUMP_LEVEL && rsi <= PUMP_LEVEL,
                prev < DUMP_LEVEL && rsi >= DUMP_LEVEL,
            ),
            None => (false, false),
        };
        Self {
            bucket,
            rsi,
            timeframe,
            pump,
            dump,
        }
    }
}

impl IndicatorPoint for RsiPoint {
    fn bucket(&self) -> Bucket {
        self.bucket
    }

    fn value(&self) -> Decimal {
        self.rsi
    }
}

/// `100 - 100 / (1 + gain / loss)`, evaluated as `100 * gain / (gain + loss)`
/// so a vanishing `avg_loss` cannot overflow. 100 without losses, 0 on a flat
/// series.
pub fn rsi_from_averages(avg_gain: Decimal, avg_loss: Decimal) -> Decimal {
    let total = avg_gain + avg_loss;
    if total.is_zero() {
        return Decimal::ZERO;
    }
    avg_gain / total * HUNDRED
}

// ============================================================================
// Calculator
// ============================================================================

/// Relative Strength Index with Wilder smoothing.
///
/// The first `period` close-to-close moves seed plain averages of gains and
/// losses; afterwards both averages are Wilder-smoothed.
#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    timeframe: Timeframe,
}

impl Rsi {
    /// Create a new RSI calculator. A zero period is treated as one.
    pub fn new(period: usize, timeframe: Timeframe) -> Self {
        Self {
            period: period.max(1),
            timeframe,
        }
    }

    fn period_dec(&self) -> Decimal {
        Decimal::from(self.period)
    }

    /// Applies one close to `state` without any bucket bookkeeping.
    fn advance(&self, state: &RsiState, close: Decimal) -> (RsiState, Option<Decimal>) {
        let mut next = state.clone();
        next.last_close = Some(close);

        let Some(prev) = state.last_close else {
            return (next, None);
        };

        let delta = close - prev;
        let gain = delta.max(Decimal::ZERO);
        let loss = (-delta).max(Decimal::ZERO);
        let period = self.period_dec();

        if !state.initialized {
            next.seed_count += 1;
            next.seed_gain_sum += gain;
            next.seed_loss_sum += loss;
            if next.seed_count < self.period {
                return (next, None);
            }
            next.avg_gain = next.seed_gain_sum / period;
            next.avg_loss = next.seed_loss_sum / period;
            next.initialized = true;
        } else {
            next.avg_gain = wilder(state.avg_gain, gain, period);
            next.avg_loss = wilder(state.avg_loss, loss, period);
        }

        let value = rsi_from_averages(next.avg_gain, next.avg_loss);
        (next, Some(value))
    }
}

impl IndicatorCalculator for Rsi {
    type State = RsiState;
    type Point = RsiPoint;

    fn kind(&self) -> IndicatorKind {
        IndicatorKind::Rsi
    }

    fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    fn period(&self) -> usize {
        self.period
    }

    fn warmup_period(&self) -> usize {
        self.period + 1
    }

    fn empty_state(&self) -> RsiState {
        RsiState::empty(self.period, self.timeframe)
    }

    fn preview(&self, state: &RsiState, candle: &Candle) -> Option<Decimal> {
        if !state.initialized || state.last_close.is_none() {
            return None;
        }
        self.advance(state, candle.close).1
    }

    fn commit_confirmed(
        &self,
        state: &RsiState,
        bucket: Bucket,
        candle: &Candle,
    ) -> IndicatorUpdate<RsiState, RsiPoint> {
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

        let (mut next, value) = self.advance(&base, candle.close);
        next.timestamp = Some(bucket);

        let point = value.map(|rsi| {
            let point = RsiPoint::new(bucket, rsi, self.timeframe, base.last_rsi());
            next.remember(bucket, rsi);
            point
        });

        IndicatorUpdate { point, state: next }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::fold;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn bucket(i: u32) -> Bucket {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Timeframe::M5.duration() * i as i32
    }

    fn feed(rsi: &Rsi, closes: &[Decimal]) -> (RsiState, Vec<RsiPoint>) {
        let entries = closes
            .iter()
            .enumerate()
            .map(|(i, close)| (bucket(i as u32), Candle::flat(*close)));
        fold(rsi, rsi.empty_state(), entries)
    }

    #[test]
    fn seeds_then_smooths() {
        let rsi = Rsi::new(2, Timeframe::M5);
        let mut state = rsi.empty_state();

        let first = rsi.commit_confirmed(&state, bucket(0), &Candle::flat(dec!(10)));
        assert!(first.point.is_none());
        assert_eq!(first.state.seed_count, 0);
        assert_eq!(first.state.last_close, Some(dec!(10)));
        state = first.state;

        let second = rsi.commit_confirmed(&state, bucket(1), &Candle::flat(dec!(12)));
        assert!(second.point.is_none());
        assert_eq!(second.state.seed_count, 1);
        state = second.state;

        let third = rsi.commit_confirmed(&state, bucket(2), &Candle::flat(dec!(11)));
        assert_eq!(third.state.seed_count, 2);
        assert_eq!(third.state.avg_gain, dec!(1));
        assert_eq!(third.state.avg_loss, dec!(0.5));
        assert_eq!(third.state.phase(), RsiPhase::Initialized);
        let point = third.point.unwrap();
        assert_eq!(point.bucket, bucket(2));
        assert_eq!(point.rsi.round_dp(6), dec!(66.666667));
        state = third.state;

        let fourth = rsi.commit_confirmed(&state, bucket(3), &Candle::flat(dec!(13)));
        assert_eq!(fourth.state.avg_gain, dec!(1.5));
        assert_eq!(fourth.state.avg_loss, dec!(0.25));
        assert_eq!(fourth.point.unwrap().rsi.round_dp(3), dec!(85.714));
    }

    #[test]
    fn commit_does_not_touch_input_state() {
        let rsi = Rsi::new(2, Timeframe::M5);
        let (state, _) = feed(&rsi, &[dec!(10), dec!(12), dec!(11)]);
        let before = state.clone();
        let _ = rsi.commit_confirmed(&state, bucket(3), &Candle::flat(dec!(13)));
        let _ = rsi.preview(&state, &Candle::flat(dec!(13)));
        assert_eq!(state, before);
    }

    #[test]
    fn saturates_on_rising_closes() {
        let rsi = Rsi::new(3, Timeframe::M5);
        let closes: Vec<Decimal> = (1..=8).map(Decimal::from).collect();
        let (state, points) = feed(&rsi, &closes);
        assert_eq!(state.avg_loss, Decimal::ZERO);
        assert_eq!(points.len(), closes.len() - rsi.warmup_period() + 1);
        assert!(points.iter().all(|p| p.rsi == dec!(100)));
    }

    #[test]
    fn flat_series_reads_zero() {
        let rsi = Rsi::new(2, Timeframe::M5);
        let (_, points) = feed(&rsi, &[dec!(5), dec!(5), dec!(5), dec!(5)]);
        assert_eq!(points.len(), 2);
        assert!(points.iter().all(|p| p.rsi.is_zero()));
    }

    #[test]
    fn gap_resets_seeding() {
        let rsi = Rsi::new(2, Timeframe::M5);
        let (state, _) = feed(&rsi, &[dec!(10), dec!(12), dec!(11), dec!(13)]);
        assert!(state.initialized);

        let update = rsi.commit_confirmed(&state, bucket(6), &Candle::flat(dec!(14)));
        assert!(update.point.is_none());
        assert_eq!(update.state.seed_count, 0);
        assert!(!update.state.initialized);
        assert_eq!(update.state.timestamp, Some(bucket(6)));
        assert_eq!(update.state.last_close, Some(dec!(14)));
    }

    #[test]
    fn step_back_resets_seeding() {
        let rsi = Rsi::new(2, Timeframe::M5);
        let (state, _) = feed(&rsi, &[dec!(10), dec!(12), dec!(11), dec!(13)]);
        assert!(state.initialized);

        let update = rsi.commit_confirmed(&state, bucket(1), &Candle::flat(dec!(50)));
        assert!(update.point.is_none());
        assert_eq!(update.state.seed_count, 0);
        assert!(!update.state.initialized);
        assert!(update.state.recent.is_empty());
        assert_eq!(update.state.timestamp, Some(bucket(1)));
        assert_eq!(update.state.last_close, Some(dec!(50)));
    }

    #[test]
    fn steep_uptrend_after_one_loss_stays_finite() {
        let rsi = Rsi::new(14, Timeframe::M5);
        let mut closes = vec![dec!(100), dec!(99)];
        closes.extend((1..=3000).map(|i| dec!(99) + Decimal::from(100 * i)));

        let (state, points) = feed(&rsi, &closes);
        assert_eq!(points.len(), closes.len() - rsi.warmup_period() + 1);
        assert!(points.iter().all(|p| p.rsi > dec!(90) && p.rsi <= dec!(100)));
        assert_eq!(points.last().unwrap().rsi.round_dp(6), dec!(100));

        let next = Candle::flat(closes[closes.len() - 1] + dec!(100));
        assert_eq!(rsi.preview(&state, &next).unwrap().round_dp(6), dec!(100));
    }

    #[test]
    fn averages_map_to_documented_extremes() {
        assert_eq!(rsi_from_averages(dec!(0), dec!(0)), dec!(0));
        assert_eq!(rsi_from_averages(dec!(3), dec!(0)), dec!(100));
        assert_eq!(rsi_from_averages(dec!(0), dec!(3)), dec!(0));
        assert_eq!(rsi_from_averages(dec!(1), dec!(1)), dec!(50));
        assert_eq!(
            rsi_from_averages(dec!(1000000), dec!(0.0000000000000000000000000001)).round_dp(6),
            dec!(100)
        );
    }

    #[test]
    fn pump_flags_a_fall_back_through_seventy() {
        let rsi = Rsi::new(2, Timeframe::M5);
        // Two readings of 100, then 33.33 after a sharp drop.
        let (state, points) = feed(&rsi, &[dec!(10), dec!(11), dec!(12), dec!(13), dec!(11)]);
        let rsis: Vec<Decimal> = points.iter().map(|p| p.rsi.round_dp(2)).collect();
        assert_eq!(rsis, vec![dec!(100), dec!(100), dec!(33.33)]);
        assert!(!points[0].pump && !points[1].pump);
        assert!(points[2].pump);
        assert!(points.iter().all(|p| !p.dump));
        assert_eq!(state.recent.len(), 3);
        assert_eq!(state.last_rsi(), Some(points[2].rsi));
    }

    #[test]
    fn dump_flags_a_climb_back_through_thirty() {
        let rsi = Rsi::new(2, Timeframe::M5);
        let (_, points) = feed(&rsi, &[dec!(13), dec!(12), dec!(11), dec!(10), dec!(12)]);
        let rsis: Vec<Decimal> = points.iter().map(|p| p.rsi.round_dp(2)).collect();
        assert_eq!(rsis, vec![dec!(0), dec!(0), dec!(66.67)]);
        assert!(!points[0].dump && !points[1].dump);
        assert!(points[2].dump);
        assert!(points.iter().all(|p| !p.pump));
    }

    #[test]
    fn first_point_after_reset_has_no_flags() {
        let rsi = Rsi::new(2, Timeframe::M5);
        let prev = Some(dec!(90));
        let point = RsiPoint::new(bucket(0), dec!(60), Timeframe::M5, prev);
        assert!(point.pump);
        assert!(!RsiPoint::new(bucket(0), dec!(60), Timeframe::M5, None).pump);

        let (state, _) = feed(&rsi, &[dec!(10), dec!(12), dec!(11), dec!(13)]);
        let reset = rsi.commit_confirmed(&state, bucket(9), &Candle::flat(dec!(1)));
        assert!(reset.state.last_rsi().is_none());
    }

    #[test]
    fn recent_history_is_bounded() {
        let rsi = Rsi::new(2, Timeframe::M5);
        let closes: Vec<Decimal> = (0..40).map(|i| Decimal::from(100 + (i * 7) % 5)).collect();
        let (state, points) = feed(&rsi, &closes);
        assert_eq!(state.recent.len(), RECENT_POINTS);
        let tail: Vec<(Bucket, Decimal)> = points[points.len() - RECENT_POINTS..]
            .iter()
            .map(|p| (p.bucket, p.rsi))
            .collect();
        assert_eq!(state.recent.iter().cloned().collect::<Vec<_>>(), tail);
    }

    #[test]
    fn preview_matches_next_commit() {
        let rsi = Rsi::new(2, Timeframe::M5);
        let (state, _) = feed(&rsi, &[dec!(10), dec!(12)]);
        assert_eq!(rsi.preview(&state, &Candle::flat(dec!(11))), None);

        let (state, _) = feed(&rsi, &[dec!(10), dec!(12), dec!(11)]);
        let candle = Candle::flat(dec!(13)).unconfirmed();
        let preview = rsi.preview(&state, &candle).unwrap();
        let committed = rsi.commit_confirmed(&state, bucket(3), &candle).point.unwrap();
        assert_eq!(preview, committed.rsi);
    }

    #[test]
    fn resuming_in_chunks_matches_single_pass() {
        let rsi = Rsi::new(3, Timeframe::M5);
        let closes = [
            dec!(44.34), dec!(44.09), dec!(44.15), dec!(43.61), dec!(44.33),
            dec!(44.83), dec!(45.10), dec!(45.42), dec!(45.84), dec!(46.08),
        ];
        let (full_state, full_points) = feed(&rsi, &closes);

        let entries: Vec<_> = closes
            .iter()
            .enumerate()
            .map(|(i, c)| (bucket(i as u32), Candle::flat(*c)))
            .collect();
        let (mid_state, mut points) = fold(&rsi, rsi.empty_state(), entries[..4].to_vec());
        let (end_state, rest) = fold(&rsi, mid_state, entries[4..].to_vec());
        points.extend(rest);

        assert_eq!(end_state, full_state);
        assert_eq!(points, full_points);
    }
}
