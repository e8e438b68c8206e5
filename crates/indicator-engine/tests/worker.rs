use std::thread;
use std::time::{Duration, Instant};

use chrono::{TimeZone, Utc};
use event_bus::{CandleEventBus, PublishMode};
use indicator_engine::{
    fold, BufferCapacities, CandleSeries, EngineConfig, IndicatorCalculator, IndicatorEngine,
    IndicatorFrame, IndicatorKind, IndicatorSeries, IndicatorWorker, Rsi,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use time_series::{Bucket, Candle, Timeframe};

fn bucket(i: usize) -> Bucket {
    Utc.with_ymd_and_hms(2025, 2, 3, 0, 0, 0).unwrap() + Timeframe::M1.duration() * i as i32
}

fn candle(i: usize) -> Candle {
    let close = Decimal::from(100 + (i * 7 % 11) as i64) - Decimal::from((i % 4) as i64);
    Candle::new(close, close + dec!(1), close - dec!(1), close, dec!(5))
}

fn wait_until(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    done()
}

#[test]
fn lossy_queue_still_converges_via_recheck() {
    let bus = CandleEventBus::builder()
        .queue_capacity(2)
        .publish_mode(PublishMode::Try)
        .build();
    let candles = CandleSeries::with_capacities("BTC-USDT", Timeframe::M1, 500, 500, bus.clone());
    let rsi = Rsi::new(6, Timeframe::M1);
    let series = IndicatorSeries::new(rsi.clone(), &candles, BufferCapacities { live: 500, historical: 500 });
    let handle = IndicatorWorker::spawn(series, &bus, 2, Duration::from_millis(20)).unwrap();

    for i in 0..200 {
        candles.handle_tick(bucket(i), candle(i));
    }

    let converged = wait_until(Duration::from_secs(5), || {
        handle.live_output().last_bucket() == Some(bucket(199))
            && handle.historical_output().last_bucket() == Some(bucket(199))
    });
    assert!(converged, "worker never caught up");

    let (_, expected) = fold(&rsi, rsi.empty_state(), candles.live_buffer().snapshot());
    let actual: Vec<_> = handle.live_output().snapshot().into_values().collect();
    assert_eq!(actual, expected);
    assert_eq!(handle.historical_output().len(), expected.len());

    let report = handle.shutdown().unwrap();
    assert!(report.handled > 0);
}

#[test]
fn finish_drains_queued_events() {
    let bus = CandleEventBus::builder()
        .queue_capacity(1_024)
        .publish_mode(PublishMode::Blocking)
        .build();
    let candles = CandleSeries::with_capacities("BTC-USDT", Timeframe::M1, 100, 1_000, bus.clone());
    let series = IndicatorSeries::new(
        Rsi::new(14, Timeframe::M1),
        &candles,
        BufferCapacities { live: 100, historical: 1_000 },
    );
    let handle = IndicatorWorker::spawn(series, &bus, 1_024, Duration::from_secs(60)).unwrap();

    for i in 0..300 {
        candles.handle_tick(bucket(i), candle(i));
    }

    let report = handle.finish().unwrap();
    assert_eq!(report.handled, 300);
    // Only the closing reconciliation.
    assert_eq!(report.rechecks, 1);
    assert_eq!(bus.subscriber_count(), 0);
    assert_eq!(bus.dropped(), 0);
}

#[test]
fn finish_catches_up_on_events_that_never_arrived() {
    let bus = CandleEventBus::builder()
        .queue_capacity(64)
        .publish_mode(PublishMode::Blocking)
        .build();
    let candles = CandleSeries::with_capacities("BTC-USDT", Timeframe::M1, 100, 100, bus.clone());
    let rsi = Rsi::new(5, Timeframe::M1);
    let series = IndicatorSeries::new(rsi.clone(), &candles, BufferCapacities { live: 100, historical: 100 });
    // Long enough that no idle recheck runs during the test.
    let handle = IndicatorWorker::spawn(series, &bus, 64, Duration::from_secs(60)).unwrap();

    for i in 0..10 {
        candles.handle_tick(bucket(i), candle(i));
    }
    // Their events are lost on the way to the worker.
    for i in 10..50 {
        candles.live_buffer().put(bucket(i), candle(i));
        candles.historical_buffer().put(bucket(i), candle(i));
    }
    let live = std::sync::Arc::clone(handle.live_output());
    let historical = std::sync::Arc::clone(handle.historical_output());

    let report = handle.finish().unwrap();
    assert_eq!(report.handled, 10);
    assert_eq!(report.rechecks, 1);

    let (_, expected) = fold(&rsi, rsi.empty_state(), candles.live_buffer().snapshot());
    assert_eq!(live.snapshot().into_values().collect::<Vec<_>>(), expected);
    assert_eq!(historical.last_bucket(), Some(bucket(49)));
}

#[test]
fn shutdown_stops_an_idle_worker() {
    let bus = CandleEventBus::default();
    let candles = CandleSeries::with_capacities("BTC-USDT", Timeframe::M1, 10, 10, bus.clone());
    let frame = IndicatorFrame::new();
    let series = IndicatorSeries::new(
        Rsi::new(3, Timeframe::M1),
        &candles,
        BufferCapacities { live: 10, historical: 10 },
    )
    .with_frame(frame.clone());
    let handle = IndicatorWorker::spawn(series, &bus, 16, Duration::from_millis(10)).unwrap();
    assert!(handle.is_running());
    thread::sleep(Duration::from_millis(50));

    let started = Instant::now();
    let report = handle.shutdown().unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(report.handled, 0);
    assert_eq!(bus.subscriber_count(), 0);
    assert!(report.rechecks > 0);
    // Idle rechecks publish the still-empty values.
    let values = frame.latest(IndicatorKind::Rsi, Timeframe::M1).unwrap();
    assert!(!values.initialized);
    assert_eq!(values.current, None);
}

#[test]
fn engine_runs_rsi_and_adx_side_by_side() {
    let config = EngineConfig {
        timeframe: Timeframe::M1,
        rsi_period: 3,
        adx_period: 3,
        recheck_interval_ms: 20,
        ..EngineConfig::default()
    };
    let engine = IndicatorEngine::start(config, PublishMode::Blocking).unwrap();

    engine
        .candles()
        .restore_from_history((0..20).map(|i| (bucket(i), candle(i))));
    for i in 20..30 {
        engine.candles().handle_tick(bucket(i), candle(i));
    }
    engine
        .candles()
        .handle_tick(bucket(30), candle(30).unconfirmed());

    let frame = engine.frame().clone();
    let settled = wait_until(Duration::from_secs(5), || {
        let rsi = frame.latest(IndicatorKind::Rsi, Timeframe::M1);
        let adx = frame.latest(IndicatorKind::Adx, Timeframe::M1);
        matches!((rsi, adx), (Some(r), Some(a)) if r.bucket == Some(bucket(30)) && a.bucket == Some(bucket(30)))
    });
    assert!(settled);

    let rsi = engine.rsi().values();
    assert!(rsi.initialized);
    assert!(rsi.current.is_some());
    assert_eq!(engine.rsi().live_output().last_bucket(), Some(bucket(29)));
    assert_eq!(engine.adx().live_output().len(), 30 - 7 + 1);

    let summary = engine.finish().unwrap();
    assert_eq!(summary.dropped, 0);
    assert_eq!(summary.published, 12);
}
