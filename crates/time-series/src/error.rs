//! Time-series error types

use thiserror::Error;

/// Errors raised at the edges of the time-series layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimeSeriesError {
    #[error("Unknown timeframe: {0} (expected one of 1m, 5m, 15m, 1H, 4H, 1D, 1W)")]
    UnknownTimeframe(String),
}

/// Type alias for time-series results
pub type TimeSeriesResult<T> = Result<T, TimeSeriesError>;
