use std::sync::Arc;

use event_bus::{CandleEventBus, PublishMode};
use tracing::info;

use crate::candles::CandleSeries;
use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::frame::IndicatorFrame;
use crate::indicators::adx::{Adx, AdxPoint};
use crate::indicators::rsi::{Rsi, RsiPoint};
use crate::series::IndicatorSeries;
use crate::worker::{IndicatorHandle, IndicatorWorker, WorkerReport};

/// Final counters of a stopped engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineSummary {
    pub rsi: WorkerReport,
    pub adx: WorkerReport,
    pub published: u64,
    pub dropped: u64,
}

/// A candle series with RSI and ADX workers attached, wired from one
/// [`EngineConfig`].
pub struct IndicatorEngine {
    config: EngineConfig,
    bus: CandleEventBus,
    candles: Arc<CandleSeries>,
    frame: IndicatorFrame,
    rsi: IndicatorHandle<RsiPoint>,
    adx: IndicatorHandle<AdxPoint>,
}

impl IndicatorEngine {
    /// Validates `config` and starts both workers. `publish_mode` decides what
    /// happens when a worker queue is full; `PublishMode::Try` drops the event.
    pub fn start(config: EngineConfig, publish_mode: PublishMode) -> EngineResult<Self> {
        config.validate()?;

        let bus = CandleEventBus::builder()
            .queue_capacity(config.queue_capacity)
            .publish_mode(publish_mode)
            .build();
        let candles = Arc::new(CandleSeries::new(&config, bus.clone()));
        let frame = IndicatorFrame::new();

        let rsi = IndicatorSeries::new(
            Rsi::new(config.rsi_period, config.timeframe),
            &candles,
            config.indicators,
        )
        .with_frame(frame.clone());
        let adx = IndicatorSeries::new(
            Adx::new(config.adx_period, config.timeframe),
            &candles,
            config.indicators,
        )
        .with_frame(frame.clone());

        let interval = config.recheck_interval();
        let rsi = IndicatorWorker::spawn(rsi, &bus, config.queue_capacity, interval)?;
        let adx = IndicatorWorker::spawn(adx, &bus, config.queue_capacity, interval)?;

        info!(
            instrument = %config.instrument,
            timeframe = %config.timeframe,
            mode = ?publish_mode,
            "✅ Indicator engine started"
        );

        Ok(Self {
            config,
            bus,
            candles,
            frame,
            rsi,
            adx,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn candles(&self) -> &Arc<CandleSeries> {
        &self.candles
    }

    pub fn frame(&self) -> &IndicatorFrame {
        &self.frame
    }

    pub fn rsi(&self) -> &IndicatorHandle<RsiPoint> {
        &self.rsi
    }

    pub fn adx(&self) -> &IndicatorHandle<AdxPoint> {
        &self.adx
    }

    /// Lets both workers drain their queues, then stops them.
    pub fn finish(self) -> EngineResult<EngineSummary> {
        let Self { bus, rsi, adx, .. } = self;
        let rsi = rsi.finish()?;
        let adx = adx.finish()?;
        Ok(summary(&bus, rsi, adx))
    }

    /// Stops both workers without draining.
    pub fn shutdown(self) -> EngineResult<EngineSummary> {
        let Self { bus, rsi, adx, .. } = self;
        let rsi = rsi.shutdown()?;
        let adx = adx.shutdown()?;
        Ok(summary(&bus, rsi, adx))
    }
}

fn summary(bus: &CandleEventBus, rsi: WorkerReport, adx: WorkerReport) -> EngineSummary {
    EngineSummary {
        rsi,
        adx,
        published: bus.published(),
        dropped: bus.dropped(),
    }
}

impl std::fmt::Debug for IndicatorEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndicatorEngine")
            .field("candles", &self.candles)
            .field("rsi", &self.rsi)
            .field("adx", &self.adx)
            .finish()
    }
}
