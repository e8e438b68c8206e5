//! Keeps an indicator output buffer in step with its source candle buffer.
//!
//! Candle events reach indicator workers over a lossy queue, so a worker can
//! never assume it saw every mutation of the candle buffer. Instead each
//! [`Reconciler`] remembers the source `version`/`epoch` it last synced to and
//! the last bucket its state folded (the bookmark), and picks one of three
//! recoveries whenever it runs:
//!
//! * append the single confirmed candle that moved the version by one,
//! * replay the suffix of the source after the bookmark,
//! * or reset the state and replay the whole retained window.

use std::fmt;
use std::sync::Arc;

use rust_decimal::Decimal;
use time_series::{Bucket, Candle, TimeSeriesBuffer};
use tracing::{debug, info};

use crate::indicators::{IndicatorCalculator, IndicatorState};

/// Which recovery a reconciliation took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Source unchanged since the last sync
    UpToDate,
    /// One confirmed candle folded directly
    Append,
    /// Entries after the bookmark replayed onto the current state
    ReplaySuffix,
    /// State reset and the full source window replayed
    ReplayAll,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Decision::UpToDate => "up-to-date",
            Decision::Append => "append",
            Decision::ReplaySuffix => "replay-suffix",
            Decision::ReplayAll => "replay-all",
        })
    }
}

/// Outcome of one [`Reconciler::reconcile`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciliation {
    pub decision: Decision,
    /// Confirmed candles folded
    pub folded: usize,
    /// Points written to the output buffer
    pub emitted: usize,
}

impl Reconciliation {
    fn up_to_date() -> Self {
        Self {
            decision: Decision::UpToDate,
            folded: 0,
            emitted: 0,
        }
    }
}

/// Reconciliation driver for one (source, output) buffer pair.
///
/// The reconciler is the single writer of its output buffer and owns the
/// indicator state; other threads only read the output.
pub struct Reconciler<C: IndicatorCalculator> {
    label: String,
    calculator: Arc<C>,
    state: C::State,
    output: Arc<TimeSeriesBuffer<C::Point>>,
    last_seen_version: Option<u64>,
    last_seen_epoch: Option<u64>,
}

impl<C: IndicatorCalculator> Reconciler<C> {
    pub fn new(
        label: impl Into<String>,
        calculator: Arc<C>,
        output: Arc<TimeSeriesBuffer<C::Point>>,
    ) -> Self {
        let state = calculator.empty_state();
        Self {
            label: label.into(),
            calculator,
            state,
            output,
            last_seen_version: None,
            last_seen_epoch: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn state(&self) -> &C::State {
        &self.state
    }

    pub fn output(&self) -> &Arc<TimeSeriesBuffer<C::Point>> {
        &self.output
    }

    /// Last folded bucket.
    pub fn bookmark(&self) -> Option<Bucket> {
        self.state.timestamp()
    }

    pub fn last_seen_version(&self) -> Option<u64> {
        self.last_seen_version
    }

    /// Speculative value for an in-progress candle against the current state.
    pub fn preview(&self, candle: &Candle) -> Option<Decimal> {
        self.calculator.preview(&self.state, candle)
    }

    /// Forgets the sync point so the next reconciliation replays everything.
    pub fn invalidate(&mut self) {
        self.last_seen_version = None;
        self.last_seen_epoch = None;
    }

    /// Brings state and output up to date with `source`.
    ///
    /// `tick` is the candle event that triggered the call, if any. Only
    /// confirmed candles are ever folded.
    pub fn reconcile(
        &mut self,
        source: &TimeSeriesBuffer<Candle>,
        tick: Option<(Bucket, &Candle)>,
    ) -> Reconciliation {
        let version = source.version();
        let epoch = source.epoch();
        let synced_epoch = self.last_seen_epoch == Some(epoch);
        let bookmark = self.bookmark();

        let confirmed_tick = tick
            .filter(|(bucket, candle)| candle.is_confirmed() && bookmark.map_or(true, |b| *bucket > b));

        if synced_epoch {
            if let Some(last) = self.last_seen_version {
                // Version unchanged: the tick, if any, never reached the buffer.
                // Version up by one: the tick is exactly that mutation.
                let appended = version == last + 1
                    && confirmed_tick.is_some_and(|(bucket, _)| source.last_bucket() == Some(bucket));

                if version == last || appended {
                    let Some((bucket, candle)) = confirmed_tick else {
                        return Reconciliation::up_to_date();
                    };
                    let emitted = usize::from(self.fold_one(bucket, candle));
                    self.mark_synced(version, epoch);
                    debug!(reconciler = %self.label, %bucket, emitted, "appended candle");
                    return Reconciliation {
                        decision: Decision::Append,
                        folded: 1,
                        emitted,
                    };
                }
            }
        }

        self.replay_suffix_or_all(source, tick)
    }

    fn replay_suffix_or_all(
        &mut self,
        source: &TimeSeriesBuffer<Candle>,
        tick: Option<(Bucket, &Candle)>,
    ) -> Reconciliation {
        let epoch = source.epoch();
        let bookmark = self.bookmark();

        let full_reason = if self.last_seen_epoch != Some(epoch) {
            Some("source window replaced")
        } else {
            match (bookmark, source.first_bucket(), source.last_bucket()) {
                (None, _, _) => Some("no bookmark"),
                (_, None, _) | (_, _, None) => Some("source empty"),
                (Some(b), _, Some(last)) if b > last => Some("state ahead of source"),
                (Some(b), _, _) if !source.contains(&b) => Some("bookmark left the window"),
                _ => None,
            }
        };

        let mut result = match full_reason {
            Some(reason) => self.replay_all(source, reason),
            None => self.replay_suffix(source),
        };

        // A tick that is not part of the window still moves the state forward.
        if let Some((bucket, candle)) = tick {
            let beyond = self.bookmark().map_or(true, |b| bucket > b);
            if candle.is_confirmed() && beyond && !source.contains(&bucket) {
                result.emitted += usize::from(self.fold_one(bucket, candle));
                result.folded += 1;
            }
        }
        result
    }

    fn replay_all(&mut self, source: &TimeSeriesBuffer<Candle>, reason: &str) -> Reconciliation {
        let read = source.read_range(None, None);
        let mut state = self.calculator.empty_state();
        let mut points = Vec::new();
        let mut folded = 0;

        for (bucket, candle) in &read.entries {
            if !candle.is_confirmed() {
                continue;
            }
            let update = self.calculator.commit_confirmed(&state, *bucket, candle);
            state = update.state;
            folded += 1;
            if let Some(point) = update.point {
                points.push((*bucket, point));
            }
        }

        let emitted = points.len();
        self.state = state;
        self.output.replace_all(points);
        self.mark_synced(read.version, read.epoch);

        info!(
            reconciler = %self.label,
            reason,
            source_size = read.entries.len(),
            folded,
            emitted,
            version = read.version,
            "🔄 Full replay"
        );

        Reconciliation {
            decision: Decision::ReplayAll,
            folded,
            emitted,
        }
    }

    fn replay_suffix(&mut self, source: &TimeSeriesBuffer<Candle>) -> Reconciliation {
        let read = source.read_range(self.bookmark(), None);

        // The window was swapped between the decision and the read.
        if self.last_seen_epoch != Some(read.epoch) {
            return self.replay_all(source, "source window replaced");
        }

        let mut folded = 0;
        let mut emitted = 0;
        for (bucket, candle) in &read.entries {
            if !candle.is_confirmed() {
                continue;
            }
            folded += 1;
            if self.fold_one(*bucket, candle) {
                emitted += 1;
            }
        }
        self.mark_synced(read.version, read.epoch);

        if folded > 0 {
            info!(
                reconciler = %self.label,
                folded,
                emitted,
                version = read.version,
                "↪️ Suffix replay"
            );
        }

        Reconciliation {
            decision: Decision::ReplaySuffix,
            folded,
            emitted,
        }
    }

    /// Commits one confirmed candle and writes its point. Returns whether a
    /// point was emitted.
    fn fold_one(&mut self, bucket: Bucket, candle: &Candle) -> bool {
        let update = self.calculator.commit_confirmed(&self.state, bucket, candle);
        self.state = update.state;
        match update.point {
            Some(point) => {
                self.output.put(bucket, point);
                true
            }
            None => false,
        }
    }

    fn mark_synced(&mut self, version: u64, epoch: u64) {
        self.last_seen_version = Some(version);
        self.last_seen_epoch = Some(epoch);
    }
}

impl<C: IndicatorCalculator> fmt::Debug for Reconciler<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("label", &self.label)
            .field("bookmark", &self.bookmark())
            .field("initialized", &self.state.is_initialized())
            .field("last_seen_version", &self.last_seen_version)
            .field("last_seen_epoch", &self.last_seen_epoch)
            .field("output", &self.output)
            .finish()
    }
}
