use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TimeSeriesError;
use crate::Bucket;

/// 1970-01-05 was the first Monday after the Unix epoch; weekly buckets open on Mondays.
const WEEK_ANCHOR_SECS: i64 = 4 * 24 * 60 * 60;

/// Candle timeframes with a fixed bucket duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Timeframe {
    /// One minute
    M1,
    /// Five minutes
    M5,
    /// Fifteen minutes
    M15,
    /// One hour
    H1,
    /// Four hours
    H4,
    /// One day
    D1,
    /// One week, Monday aligned
    W1,
}

impl Timeframe {
    /// All supported timeframes, shortest first.
    pub const ALL: [Timeframe; 7] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::D1,
        Timeframe::W1,
    ];

    /// Bucket width.
    pub fn duration(self) -> TimeDelta {
        TimeDelta::seconds(self.seconds())
    }

    /// Bucket width in whole seconds.
    pub fn seconds(self) -> i64 {
        match self {
            Timeframe::M1 => 60,
            Timeframe::M5 => 5 * 60,
            Timeframe::M15 => 15 * 60,
            Timeframe::H1 => 60 * 60,
            Timeframe::H4 => 4 * 60 * 60,
            Timeframe::D1 => 24 * 60 * 60,
            Timeframe::W1 => 7 * 24 * 60 * 60,
        }
    }

    /// Exchange-style code, e.g. `5m` or `4H`.
    pub fn code(self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::H1 => "1H",
            Timeframe::H4 => "4H",
            Timeframe::D1 => "1D",
            Timeframe::W1 => "1W",
        }
    }

    /// Floors `ts` to the start of the bucket containing it.
    pub fn align(self, ts: DateTime<Utc>) -> Bucket {
        let width = self.seconds();
        let anchor = match self {
            Timeframe::W1 => WEEK_ANCHOR_SECS,
            _ => 0,
        };
        let secs = ts.timestamp();
        let start = secs - (secs - anchor).rem_euclid(width);
        DateTime::from_timestamp(start, 0).unwrap_or(ts)
    }

    /// The bucket immediately following `bucket`.
    pub fn next_bucket(self, bucket: Bucket) -> Bucket {
        bucket + self.duration()
    }

    /// Whether `bucket` sits exactly on a bucket boundary.
    pub fn is_aligned(self, bucket: Bucket) -> bool {
        self.align(bucket) == bucket
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Timeframe {
    type Err = TimeSeriesError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let code = trimmed
            .strip_prefix("CANDLE_")
            .or_else(|| trimmed.strip_prefix("candle_"));

        // Enum-style names are upper case throughout, so `CANDLE_1M` means one minute.
        if let Some(code) = code {
            return match code.to_ascii_uppercase().as_str() {
                "1M" => Ok(Timeframe::M1),
                "5M" => Ok(Timeframe::M5),
                "15M" => Ok(Timeframe::M15),
                "1H" => Ok(Timeframe::H1),
                "4H" => Ok(Timeframe::H4),
                "1D" => Ok(Timeframe::D1),
                "1W" => Ok(Timeframe::W1),
                _ => Err(TimeSeriesError::UnknownTimeframe(value.to_string())),
            };
        }

        // Exchange codes: lower-case `m` is minutes, upper-case `M` would be months.
        match trimmed {
            "1m" => Ok(Timeframe::M1),
            "5m" => Ok(Timeframe::M5),
            "15m" => Ok(Timeframe::M15),
            "1H" | "1h" => Ok(Timeframe::H1),
            "4H" | "4h" => Ok(Timeframe::H4),
            "1D" | "1d" => Ok(Timeframe::D1),
            "1W" | "1w" => Ok(Timeframe::W1),
            _ => Err(TimeSeriesError::UnknownTimeframe(value.to_string())),
        }
    }
}

impl TryFrom<String> for Timeframe {
    type Error = TimeSeriesError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timeframe> for String {
    fn from(value: Timeframe) -> Self {
        value.code().to_string()
    }
}
