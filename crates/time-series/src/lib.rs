//! # Time Series
//!
//! Bucketed, bounded, versioned storage for candles and indicator points.
//! Every entry is keyed by the start of its timeframe bucket; buffers keep only
//! the most recent buckets and expose a monotonic version so downstream
//! consumers can cheaply detect that something changed.

pub mod buffer;
pub mod candle;
pub mod error;
pub mod timeframe;

pub use buffer::{ContinuityGap, TimeSeriesBuffer, DEFAULT_BATCH_SIZE};
pub use candle::{BucketedCandle, Candle};
pub use error::{TimeSeriesError, TimeSeriesResult};
pub use timeframe::Timeframe;

use chrono::{DateTime, Utc};

/// Timeframe-aligned timestamp identifying one candle/indicator slot.
pub type Bucket = DateTime<Utc>;
