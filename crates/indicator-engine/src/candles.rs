use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use event_bus::{CandleEvent, CandleEventBus, PublishReport};
use time_series::{Bucket, Candle, ContinuityGap, TimeSeriesBuffer, Timeframe};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;

/// Live and historical candle buffers for one instrument and timeframe.
///
/// This is the single writer of both buffers. Every mutation is followed by a
/// candle event so indicator workers know to reconcile.
pub struct CandleSeries {
    instrument: String,
    timeframe: Timeframe,
    live: Arc<TimeSeriesBuffer<Candle>>,
    historical: Arc<TimeSeriesBuffer<Candle>>,
    bus: CandleEventBus,
    continuity_window: usize,
}

impl CandleSeries {
    pub fn new(config: &EngineConfig, bus: CandleEventBus) -> Self {
        Self::with_capacities(
            config.instrument.clone(),
            config.timeframe,
            config.candles.live,
            config.candles.historical,
            bus,
        )
        .continuity_window(config.continuity_window)
    }

    pub fn with_capacities(
        instrument: impl Into<String>,
        timeframe: Timeframe,
        live_capacity: usize,
        historical_capacity: usize,
        bus: CandleEventBus,
    ) -> Self {
        let instrument = instrument.into();
        let live = TimeSeriesBuffer::new(format!("candles.{instrument}.{timeframe}.live"), live_capacity);
        let historical = TimeSeriesBuffer::new(
            format!("candles.{instrument}.{timeframe}.historical"),
            historical_capacity,
        );
        Self {
            instrument,
            timeframe,
            live: Arc::new(live),
            historical: Arc::new(historical),
            bus,
            continuity_window: 10,
        }
    }

    /// Adjacent pairs checked after each confirmed tick, i.e. the last
    /// `entries + 1` live candles.
    pub fn continuity_window(mut self, entries: usize) -> Self {
        self.continuity_window = entries;
        self
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn live_buffer(&self) -> &Arc<TimeSeriesBuffer<Candle>> {
        &self.live
    }

    pub fn historical_buffer(&self) -> &Arc<TimeSeriesBuffer<Candle>> {
        &self.historical
    }

    pub fn bus(&self) -> &CandleEventBus {
        &self.bus
    }

    /// Records a candle from the live feed and publishes a `Tick`.
    ///
    /// Confirmed candles are stored in both buffers. Unconfirmed candles are
    /// only published, so workers can preview them; they never enter a buffer.
    pub fn handle_tick(&self, bucket: Bucket, candle: Candle) -> PublishReport {
        let aligned = self.timeframe.align(bucket);
        if aligned != bucket {
            debug!(series = %self.live.name(), %bucket, %aligned, "aligned candle bucket");
        }

        if candle.is_confirmed() {
            self.live.put(aligned, candle.clone());
            self.historical.put(aligned, candle.clone());
            self.check_live_continuity();
        }

        self.bus
            .publish(CandleEvent::tick(self.instrument.clone(), self.timeframe, aligned, candle))
    }

    /// Bulk-loads candles (e.g. from persistence or a REST backfill) into both
    /// buffers and publishes a `History` event.
    pub fn restore_from_history<I>(&self, candles: I) -> PublishReport
    where
        I: IntoIterator<Item = (Bucket, Candle)>,
    {
        let window: BTreeMap<Bucket, Candle> = candles
            .into_iter()
            .map(|(bucket, candle)| (self.timeframe.align(bucket), candle))
            .collect();
        let count = window.len();

        self.live.restore_all(window.clone());
        self.historical.restore_all(window);

        let last = self.historical.last_bucket();
        info!(
            instrument = %self.instrument,
            timeframe = %self.timeframe,
            restored = count,
            live = self.live.len(),
            historical = self.historical.len(),
            last = ?last,
            "📥 Candle history restored"
        );

        self.bus
            .publish(CandleEvent::history(self.instrument.clone(), self.timeframe, last))
    }

    /// Runs the continuity diagnostic over the recent live window.
    pub fn check_live_continuity(&self) -> Vec<ContinuityGap> {
        let gaps = self
            .live
            .check_continuity(self.continuity_window + 1, self.timeframe.duration());
        if !gaps.is_empty() {
            warn!(
                series = %self.live.name(),
                gaps = gaps.len(),
                "⚠️ Live candle buffer has gaps"
            );
        }
        gaps
    }

    /// Whether the live buffer is full and fresh as of `now`.
    pub fn is_live_actual(&self, now: DateTime<Utc>, margin: chrono::TimeDelta) -> bool {
        self.live
            .is_actual(self.timeframe, now, Some(self.live.capacity()), margin)
    }

    /// Whether the historical buffer is fresh as of `now`.
    pub fn is_historical_actual(&self, now: DateTime<Utc>, margin: chrono::TimeDelta) -> bool {
        self.historical.is_actual(self.timeframe, now, None, margin)
    }
}

impl std::fmt::Debug for CandleSeries {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandleSeries")
            .field("instrument", &self.instrument)
            .field("timeframe", &self.timeframe)
            .field("live", &self.live)
            .field("historical", &self.historical)
            .finish()
    }
}
