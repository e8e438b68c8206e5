use std::sync::Arc;

use chrono::Utc;
use event_bus::{CandleEvent, CandleEventKind};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use time_series::{Bucket, Candle, TimeSeriesBuffer};
use tracing::debug;

use crate::candles::CandleSeries;
use crate::config::BufferCapacities;
use crate::frame::{IndicatorFrame, IndicatorKey, IndicatorValues};
use crate::indicators::{IndicatorCalculator, IndicatorPoint, IndicatorState};
use crate::reconcile::{Reconciler, Reconciliation};

/// One indicator over one candle series: live and historical output buffers,
/// each kept in sync with its candle buffer by its own [`Reconciler`].
pub struct IndicatorSeries<C: IndicatorCalculator> {
    name: String,
    instrument: String,
    calculator: Arc<C>,
    live_source: Arc<TimeSeriesBuffer<Candle>>,
    historical_source: Arc<TimeSeriesBuffer<Candle>>,
    live: Reconciler<C>,
    historical: Reconciler<C>,
    values: Arc<RwLock<IndicatorValues>>,
    frame: Option<IndicatorFrame>,
}

impl<C: IndicatorCalculator> IndicatorSeries<C> {
    pub fn new(calculator: C, candles: &CandleSeries, capacities: BufferCapacities) -> Self {
        let calculator = Arc::new(calculator);
        let name = format!("{}.{}", candles.instrument(), calculator.name());
        let live_output = Arc::new(TimeSeriesBuffer::new(format!("{name}.live"), capacities.live));
        let historical_output = Arc::new(TimeSeriesBuffer::new(
            format!("{name}.historical"),
            capacities.historical,
        ));

        let key = IndicatorKey {
            kind: calculator.kind(),
            timeframe: calculator.timeframe(),
            period: calculator.period(),
        };

        Self {
            live: Reconciler::new(format!("{name}.live"), Arc::clone(&calculator), live_output),
            historical: Reconciler::new(
                format!("{name}.historical"),
                Arc::clone(&calculator),
                historical_output,
            ),
            name,
            instrument: candles.instrument().to_string(),
            calculator,
            live_source: Arc::clone(candles.live_buffer()),
            historical_source: Arc::clone(candles.historical_buffer()),
            values: Arc::new(RwLock::new(IndicatorValues::new(key))),
            frame: None,
        }
    }

    /// Also publish every value update into `frame`.
    pub fn with_frame(mut self, frame: IndicatorFrame) -> Self {
        self.frame = Some(frame);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn calculator(&self) -> &C {
        &self.calculator
    }

    pub fn live_output(&self) -> Arc<TimeSeriesBuffer<C::Point>> {
        Arc::clone(self.live.output())
    }

    pub fn historical_output(&self) -> Arc<TimeSeriesBuffer<C::Point>> {
        Arc::clone(self.historical.output())
    }

    pub fn live_state(&self) -> &C::State {
        self.live.state()
    }

    pub fn historical_state(&self) -> &C::State {
        self.historical.state()
    }

    /// Shared handle to the latest values, readable from any thread.
    pub fn values_handle(&self) -> Arc<RwLock<IndicatorValues>> {
        Arc::clone(&self.values)
    }

    pub fn values(&self) -> IndicatorValues {
        self.values.read().clone()
    }

    /// Handles one candle event. Returns the live reconciliation, or `None`
    /// when the event was ignored.
    pub fn handle_event(&mut self, event: &CandleEvent) -> Option<Reconciliation> {
        if event.timeframe != self.calculator.timeframe() || event.instrument != self.instrument {
            debug!(indicator = %self.name, timeframe = %event.timeframe, "ignoring foreign candle event");
            return None;
        }

        match event.kind {
            CandleEventKind::History => {
                let live = self.live.reconcile(&self.live_source, None);
                self.historical.reconcile(&self.historical_source, None);
                self.publish(event.bucket, None);
                Some(live)
            }
            CandleEventKind::Tick => {
                let (bucket, candle) = event.tick_payload()?;
                if self.is_obsolete(bucket) {
                    debug!(indicator = %self.name, %bucket, "skipping obsolete candle event");
                    return None;
                }

                if candle.is_confirmed() {
                    let live = self.live.reconcile(&self.live_source, Some((bucket, candle)));
                    self.historical
                        .reconcile(&self.historical_source, Some((bucket, candle)));
                    self.publish(Some(bucket), None);
                    Some(live)
                } else {
                    let live = self.live.reconcile(&self.live_source, None);
                    let preview = self.live.preview(candle);
                    self.publish(Some(bucket), preview);
                    Some(live)
                }
            }
        }
    }

    /// Reconciles both outputs without an event, e.g. after an idle period.
    pub fn recheck(&mut self) -> Reconciliation {
        let live = self.live.reconcile(&self.live_source, None);
        self.historical.reconcile(&self.historical_source, None);
        let bucket = self.values.read().bucket;
        self.publish(bucket, None);
        live
    }

    fn is_obsolete(&self, bucket: Bucket) -> bool {
        self.live.bookmark().is_some_and(|last| bucket <= last)
    }

    fn publish(&self, bucket: Option<Bucket>, preview: Option<Decimal>) {
        let confirmed = self.live.output().last_item().map(|p| p.value());
        let snapshot = {
            let mut values = self.values.write();
            values.confirmed = confirmed;
            values.current = preview.or(confirmed);
            values.bucket = bucket.or(values.bucket);
            values.processed_at = Some(Utc::now());
            values.initialized = self.live.state().is_initialized();
            values.clone()
        };
        if let Some(frame) = &self.frame {
            frame.update(snapshot);
        }
    }
}

impl<C: IndicatorCalculator> std::fmt::Debug for IndicatorSeries<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndicatorSeries")
            .field("name", &self.name)
            .field("live", &self.live)
            .field("historical", &self.historical)
            .finish()
    }
}
