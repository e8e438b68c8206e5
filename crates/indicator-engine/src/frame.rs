use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time_series::{Bucket, Timeframe};

use crate::indicators::IndicatorKind;

/// Identifies one running indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IndicatorKey {
    pub kind: IndicatorKind,
    pub timeframe: Timeframe,
    pub period: usize,
}

/// Latest values published by an indicator worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorValues {
    pub key: IndicatorKey,
    /// Latest value, previewed or confirmed
    pub current: Option<Decimal>,
    /// Latest committed value
    pub confirmed: Option<Decimal>,
    /// Bucket of the last handled candle
    pub bucket: Option<Bucket>,
    pub processed_at: Option<DateTime<Utc>>,
    pub initialized: bool,
}

impl IndicatorValues {
    pub fn new(key: IndicatorKey) -> Self {
        Self {
            key,
            current: None,
            confirmed: None,
            bucket: None,
            processed_at: None,
            initialized: false,
        }
    }
}

/// Latest values of every running indicator, shared across threads.
#[derive(Debug, Clone, Default)]
pub struct IndicatorFrame {
    values: Arc<DashMap<IndicatorKey, IndicatorValues>>,
}

impl IndicatorFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, values: IndicatorValues) {
        self.values.insert(values.key, values);
    }

    pub fn get(&self, key: &IndicatorKey) -> Option<IndicatorValues> {
        self.values.get(key).map(|entry| entry.value().clone())
    }

    /// First entry for `kind` on `timeframe`, whatever its period.
    pub fn latest(&self, kind: IndicatorKind, timeframe: Timeframe) -> Option<IndicatorValues> {
        self.snapshot()
            .into_iter()
            .find(|v| v.key.kind == kind && v.key.timeframe == timeframe)
    }

    pub fn remove(&self, key: &IndicatorKey) -> Option<IndicatorValues> {
        self.values.remove(key).map(|(_, v)| v)
    }

    /// All entries ordered by key.
    pub fn snapshot(&self) -> Vec<IndicatorValues> {
        let mut all: Vec<IndicatorValues> = self.values.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|v| v.key);
        all
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn key(kind: IndicatorKind, period: usize) -> IndicatorKey {
        IndicatorKey {
            kind,
            timeframe: Timeframe::M5,
            period,
        }
    }

    #[test]
    fn snapshot_is_sorted_and_latest_wins() {
        let frame = IndicatorFrame::new();
        let mut adx = IndicatorValues::new(key(IndicatorKind::Adx, 14));
        adx.current = Some(dec!(20));
        frame.update(adx.clone());
        frame.update(IndicatorValues::new(key(IndicatorKind::Rsi, 14)));

        adx.current = Some(dec!(25));
        frame.update(adx);

        let snapshot = frame.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].key.kind, IndicatorKind::Rsi);
        assert_eq!(
            frame.latest(IndicatorKind::Adx, Timeframe::M5).unwrap().current,
            Some(dec!(25))
        );
        assert!(frame.latest(IndicatorKind::Adx, Timeframe::H1).is_none());

        assert!(frame.remove(&key(IndicatorKind::Rsi, 14)).is_some());
        assert_eq!(frame.len(), 1);
    }
}
