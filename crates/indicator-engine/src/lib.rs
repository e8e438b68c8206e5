//! # Indicator Engine
//!
//! Incremental RSI and ADX over bounded candle buffers. Calculators are pure
//! state transitions; [`Reconciler`] keeps each indicator's output buffer in
//! step with its candle buffer using buffer versions instead of content
//! diffs; [`IndicatorWorker`] runs one indicator per thread behind a lossy
//! event queue.

pub mod candles;
pub mod config;
pub mod engine;
pub mod error;
pub mod frame;
pub mod indicators;
pub mod reconcile;
pub mod series;
pub mod worker;

pub use candles::CandleSeries;
pub use config::{BufferCapacities, EngineConfig};
pub use engine::{EngineSummary, IndicatorEngine};
pub use error::{EngineError, EngineResult};
pub use frame::{IndicatorFrame, IndicatorKey, IndicatorValues};
pub use indicators::prelude::*;
pub use reconcile::{Decision, Reconciler, Reconciliation};
pub use series::IndicatorSeries;
pub use worker::{IndicatorHandle, IndicatorWorker, WorkerReport};
