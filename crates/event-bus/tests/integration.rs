use std::time::Duration;

use chrono::{TimeZone, Utc};
use event_bus::{CandleEvent, CandleEventBus, CandleEventKind, EventBusError, PublishMode};
use rust_decimal_macros::dec;
use time_series::{Bucket, Candle, Timeframe};

fn bucket(minute: u32) -> Bucket {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, minute, 0).unwrap()
}

fn tick(timeframe: Timeframe, minute: u32) -> CandleEvent {
    CandleEvent::tick("BTC-USDT", timeframe, bucket(minute), Candle::flat(dec!(100)))
}

#[test]
fn fans_out_by_timeframe() {
    let bus = CandleEventBus::default();
    let five = bus.subscribe("rsi-5m", Some(Timeframe::M5));
    let fifteen = bus.subscribe("rsi-15m", Some(Timeframe::M15));
    let all = bus.subscribe("audit", None);

    let report = bus.publish(tick(Timeframe::M5, 5));
    assert_eq!(report.delivered, 2);
    assert_eq!(report.dropped, 0);

    assert_eq!(five.receiver.try_recv().unwrap().timeframe, Timeframe::M5);
    assert_eq!(fifteen.receiver.try_recv(), Err(EventBusError::Empty));
    assert_eq!(all.receiver.try_recv().unwrap().kind, CandleEventKind::Tick);
}

#[test]
fn full_queue_drops_newest_event() {
    let bus = CandleEventBus::builder().queue_capacity(2).build();
    let sub = bus.subscribe("slow-worker", Some(Timeframe::M1));

    for minute in 0..3 {
        bus.publish(tick(Timeframe::M1, minute));
    }

    assert_eq!(bus.published(), 3);
    assert_eq!(bus.dropped(), 1);
    assert_eq!(bus.stats()[0].dropped, 1);
    assert_eq!(bus.stats()[0].queued, 2);

    // The two oldest events survive; the newest was the one dropped.
    assert_eq!(sub.receiver.try_recv().unwrap().bucket, Some(bucket(0)));
    assert_eq!(sub.receiver.try_recv().unwrap().bucket, Some(bucket(1)));
    assert_eq!(sub.receiver.try_recv(), Err(EventBusError::Empty));
}

#[test]
fn blocking_mode_waits_for_consumer() {
    let bus = CandleEventBus::builder()
        .queue_capacity(1)
        .publish_mode(PublishMode::Blocking)
        .build();
    let sub = bus.subscribe("replay", None);

    let consumer = std::thread::spawn(move || {
        let mut seen = 0;
        while sub.receiver.recv_timeout(Duration::from_millis(200)).is_ok() {
            seen += 1;
            if seen == 5 {
                break;
            }
        }
        seen
    });

    for minute in 0..5 {
        assert_eq!(bus.publish(tick(Timeframe::M1, minute)).delivered, 1);
    }
    assert_eq!(consumer.join().unwrap(), 5);
    assert_eq!(bus.dropped(), 0);
}

#[test]
fn unsubscribe_disconnects_after_drain() {
    let bus = CandleEventBus::default();
    let sub = bus.subscribe("adx-5m", None);
    bus.publish(CandleEvent::history("BTC-USDT", Timeframe::M5, None));

    bus.unsubscribe(sub.id).unwrap();
    assert_eq!(bus.subscriber_count(), 0);
    assert_eq!(
        bus.unsubscribe(sub.id),
        Err(EventBusError::UnknownSubscription(sub.id))
    );

    assert_eq!(sub.receiver.try_recv().unwrap().kind, CandleEventKind::History);
    assert_eq!(sub.receiver.try_recv(), Err(EventBusError::Disconnected));
}

#[test]
fn closed_receivers_are_pruned_on_publish() {
    let bus = CandleEventBus::default();
    let sub = bus.subscribe("short-lived", None);
    drop(sub);

    let report = bus.publish(tick(Timeframe::H1, 0));
    assert_eq!(report, Default::default());
    assert_eq!(bus.subscriber_count(), 0);
}
