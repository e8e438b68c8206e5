//! # Indicator Stream
//!
//! Incremental RSI and ADX over a live candle feed.
//!
//! ## Layout
//!
//! - [`time_series`]: bounded, versioned bucket buffers and candle types
//! - [`event_bus`]: bounded fan-out of candle events to indicator workers
//! - [`indicator_engine`]: calculators, reconciliation and workers
//! - [`replay`]: feeds a recorded candle file through a fresh engine
//!
//! ## Example
//!
//! ```no_run
//! use indicator_stream::indicator_engine::EngineConfig;
//! use indicator_stream::replay::{load_candles, run_replay, ReplayOptions};
//!
//! # fn main() -> anyhow::Result<()> {
//! let candles = load_candles("candles.json".as_ref())?;
//! let report = run_replay(EngineConfig::default(), candles, ReplayOptions::default())?;
//! println!("{} RSI points", report.rsi.len());
//! # Ok(())
//! # }
//! ```

pub mod replay;

pub use event_bus;
pub use indicator_engine;
pub use time_series;

/// Version of the indicator stream package
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
