use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use event_bus::{CandleEventBus, EventBusError, SubscriptionId};
use parking_lot::RwLock;
use time_series::TimeSeriesBuffer;
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};
use crate::frame::IndicatorValues;
use crate::indicators::IndicatorCalculator;
use crate::series::IndicatorSeries;

/// Counters returned when a worker stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub handled: u64,
    pub rechecks: u64,
}

/// Spawns indicator workers.
pub struct IndicatorWorker;

impl IndicatorWorker {
    /// Subscribes `series` to `bus` for its timeframe and starts a dedicated
    /// thread that handles events until shut down. When no event arrives for
    /// `recheck_interval` the worker reconciles on its own.
    pub fn spawn<C: IndicatorCalculator>(
        series: IndicatorSeries<C>,
        bus: &CandleEventBus,
        queue_capacity: usize,
        recheck_interval: Duration,
    ) -> EngineResult<IndicatorHandle<C::Point>> {
        let name = series.name().to_string();
        let subscription = bus.subscribe_with_capacity(
            name.clone(),
            Some(series.calculator().timeframe()),
            queue_capacity,
        );
        let subscription_id = subscription.id;
        let receiver = subscription.receiver;

        let running = Arc::new(AtomicBool::new(true));
        let handled = Arc::new(AtomicU64::new(0));
        let values = series.values_handle();
        let live_output = series.live_output();
        let historical_output = series.historical_output();

        let thread_running = Arc::clone(&running);
        let thread_handled = Arc::clone(&handled);
        let thread_name = name.clone();

        let spawned = thread::Builder::new()
            .name(format!("indicator-{name}"))
            .spawn(move || {
                let mut series = series;
                let mut report = WorkerReport::default();
                info!(worker = %thread_name, "🚀 Indicator worker started");

                while thread_running.load(Ordering::Acquire) {
                    match receiver.recv_timeout(recheck_interval) {
                        Ok(event) => {
                            series.handle_event(&event);
                            report.handled += 1;
                            thread_handled.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(EventBusError::RecvTimeout) => {
                            series.recheck();
                            report.rechecks += 1;
                        }
                        Err(err) => {
                            debug!(worker = %thread_name, error = %err, "event queue closed");
                            // Catch up on anything dropped before the queue closed.
                            if thread_running.load(Ordering::Acquire) {
                                series.recheck();
                                report.rechecks += 1;
                            }
                            break;
                        }
                    }
                }

                info!(
                    worker = %thread_name,
                    handled = report.handled,
                    rechecks = report.rechecks,
                    "🛑 Indicator worker stopped"
                );
                report
            });

        let join = match spawned {
            Ok(join) => join,
            Err(source) => {
                let _ = bus.unsubscribe(subscription_id);
                return Err(EngineError::Spawn { name, source });
            }
        };

        Ok(IndicatorHandle {
            name,
            subscription_id,
            bus: bus.clone(),
            running,
            handled,
            values,
            live_output,
            historical_output,
            join: Some(join),
        })
    }
}

/// Owner-side handle of a running indicator worker.
pub struct IndicatorHandle<P> {
    name: String,
    subscription_id: SubscriptionId,
    bus: CandleEventBus,
    running: Arc<AtomicBool>,
    handled: Arc<AtomicU64>,
    values: Arc<RwLock<IndicatorValues>>,
    live_output: Arc<TimeSeriesBuffer<P>>,
    historical_output: Arc<TimeSeriesBuffer<P>>,
    join: Option<JoinHandle<WorkerReport>>,
}

impl<P: Clone> IndicatorHandle<P> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> IndicatorValues {
        self.values.read().clone()
    }

    /// Events handled so far.
    pub fn handled(&self) -> u64 {
        self.handled.load(Ordering::Relaxed)
    }

    pub fn live_output(&self) -> &Arc<TimeSeriesBuffer<P>> {
        &self.live_output
    }

    pub fn historical_output(&self) -> &Arc<TimeSeriesBuffer<P>> {
        &self.historical_output
    }

    pub fn is_running(&self) -> bool {
        self.join.as_ref().is_some_and(|j| !j.is_finished())
    }

    /// Stops after the event in hand, discarding whatever is still queued.
    pub fn shutdown(mut self) -> EngineResult<WorkerReport> {
        self.running.store(false, Ordering::Release);
        self.detach();
        self.join_worker()
    }

    /// Stops accepting new events, handles everything already queued,
    /// reconciles once more against the candle buffers, then stops.
    pub fn finish(mut self) -> EngineResult<WorkerReport> {
        self.detach();
        self.join_worker()
    }

    fn detach(&self) {
        if let Err(err) = self.bus.unsubscribe(self.subscription_id) {
            debug!(worker = %self.name, error = %err, "subscription already gone");
        }
    }

    fn join_worker(&mut self) -> EngineResult<WorkerReport> {
        match self.join.take() {
            Some(join) => join
                .join()
                .map_err(|_| EngineError::WorkerPanicked(self.name.clone())),
            None => Ok(WorkerReport::default()),
        }
    }
}

impl<P> Drop for IndicatorHandle<P> {
    fn drop(&mut self) {
        if self.join.is_some() {
            warn!(worker = %self.name, "indicator handle dropped without shutdown");
            self.running.store(false, Ordering::Release);
            let _ = self.bus.unsubscribe(self.subscription_id);
        }
    }
}

impl<P> std::fmt::Debug for IndicatorHandle<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndicatorHandle")
            .field("name", &self.name)
            .field("subscription_id", &self.subscription_id)
            .field("running", &self.running.load(Ordering::Relaxed))
            .finish()
    }
}
