//! Offline replay of a recorded candle stream through the indicator engine.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use event_bus::PublishMode;
use indicator_engine::{
    AdxPoint, EngineConfig, EngineSummary, IndicatorEngine, IndicatorValues, RsiPoint,
};
use serde::Serialize;
use time_series::{Bucket, BucketedCandle, Timeframe};
use tracing::{info, warn};

/// Reads a JSON array of `{ "bucket": ..., "open": ..., ... }` candles.
pub fn load_candles(path: &Path) -> Result<Vec<BucketedCandle>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read candle file {}", path.display()))?;
    let candles: Vec<BucketedCandle> = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse candle file {}", path.display()))?;
    info!(path = %path.display(), candles = candles.len(), "📂 Candle file loaded");
    Ok(candles)
}

/// How the recorded candles are fed to the engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplayOptions {
    /// Leading candles restored in bulk before the rest are ticked in.
    pub history: usize,
    /// Keep only the last `tail` indicator points in the report.
    pub tail: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub instrument: String,
    pub timeframe: Timeframe,
    pub candles: usize,
    pub first_bucket: Option<Bucket>,
    pub last_bucket: Option<Bucket>,
    pub rsi: Vec<RsiPoint>,
    pub adx: Vec<AdxPoint>,
    pub values: Vec<IndicatorValues>,
    pub published: u64,
    pub dropped: u64,
    pub finished_at: DateTime<Utc>,
}

/// Feeds `candles` through a fresh engine and collects the historical
/// indicator outputs once both workers have drained.
pub fn run_replay(
    config: EngineConfig,
    mut candles: Vec<BucketedCandle>,
    options: ReplayOptions,
) -> Result<ReplayReport> {
    if candles.is_empty() {
        bail!("no candles to replay");
    }
    candles.sort_by_key(|c| c.bucket);
    let total = candles.len();
    if total > config.candles.historical {
        warn!(
            candles = total,
            capacity = config.candles.historical,
            "replay is longer than the historical window, oldest candles will be evicted"
        );
    }

    let engine = IndicatorEngine::start(config, PublishMode::Blocking)
        .context("failed to start indicator engine")?;
    let instrument = engine.config().instrument.clone();
    let timeframe = engine.config().timeframe;

    let split = options.history.min(total);
    let (history, live) = candles.split_at(split);
    if !history.is_empty() {
        engine
            .candles()
            .restore_from_history(history.iter().map(|c| (c.bucket, c.candle.clone())));
    }
    for c in live {
        engine.candles().handle_tick(c.bucket, c.candle.clone());
    }

    let rsi_output = Arc::clone(engine.rsi().historical_output());
    let adx_output = Arc::clone(engine.adx().historical_output());
    let historical = Arc::clone(engine.candles().historical_buffer());
    let frame = engine.frame().clone();

    // Drains both worker queues, so the outputs are final afterwards.
    let summary = engine.finish().context("indicator workers failed")?;

    let rsi = tail(rsi_output.snapshot().into_values().collect(), options.tail);
    let adx = tail(adx_output.snapshot().into_values().collect(), options.tail);
    let report = ReplayReport {
        instrument,
        timeframe,
        candles: total,
        first_bucket: historical.first_bucket(),
        last_bucket: historical.last_bucket(),
        rsi,
        adx,
        values: frame.snapshot(),
        published: summary.published,
        dropped: summary.dropped,
        finished_at: Utc::now(),
    };
    log_summary(&summary, &report);
    Ok(report)
}

fn tail<T>(mut points: Vec<T>, keep: Option<usize>) -> Vec<T> {
    if let Some(keep) = keep {
        let skip = points.len().saturating_sub(keep);
        points.drain(..skip);
    }
    points
}

fn log_summary(summary: &EngineSummary, report: &ReplayReport) {
    info!(
        candles = report.candles,
        rsi_points = report.rsi.len(),
        adx_points = report.adx.len(),
        rsi_events = summary.rsi.handled,
        adx_events = summary.adx.handled,
        dropped = summary.dropped,
        "✅ Replay finished"
    );
}
