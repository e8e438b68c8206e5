//! # Engine Configuration
//!
//! Buffer capacities, indicator periods and worker tuning. Values come from
//! defaults, an optional TOML/JSON file and `INDICATOR_*` environment
//! variables, in that order of precedence (later wins).

use std::path::Path;
use std::time::Duration;

use chrono::TimeDelta;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use time_series::Timeframe;
use tracing::info;

/// Capacities of a live/historical buffer pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferCapacities {
    /// Small window of recent entries
    pub live: usize,
    /// Long window used for the full series
    pub historical: usize,
}

impl Default for BufferCapacities {
    fn default() -> Self {
        Self {
            live: 300,
            historical: 10_000,
        }
    }
}

/// Indicator engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Instrument the candles belong to
    pub instrument: String,

    /// Candle timeframe the indicators run on
    pub timeframe: Timeframe,

    /// Candle buffer capacities
    pub candles: BufferCapacities,

    /// Indicator output buffer capacities
    pub indicators: BufferCapacities,

    /// RSI period
    pub rsi_period: usize,

    /// ADX period
    pub adx_period: usize,

    /// Per-worker event queue capacity
    pub queue_capacity: usize,

    /// Extra entries inspected by the continuity diagnostic
    pub continuity_window: usize,

    /// Idle time after which a worker re-checks its buffers
    pub recheck_interval_ms: u64,

    /// Slack allowed on top of two bucket widths when judging freshness
    pub actuality_margin_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            instrument: "BTC-USDT".to_string(),
            timeframe: Timeframe::M5,
            candles: BufferCapacities::default(),
            indicators: BufferCapacities::default(),
            rsi_period: 14,
            adx_period: 14,
            queue_capacity: 4_096,
            continuity_window: 10,
            recheck_interval_ms: 1_000,
            actuality_margin_secs: 10,
        }
    }
}

impl EngineConfig {
    /// Loads defaults, then `path` if given, then `INDICATOR_*` environment
    /// overrides (`INDICATOR_RSI_PERIOD`, `INDICATOR_CANDLES__LIVE`, ...).
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let config = builder
            .add_source(
                Environment::with_prefix("INDICATOR")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let engine_config: EngineConfig = config.try_deserialize()?;
        engine_config.validate()?;

        info!("Indicator engine configuration loaded:");
        info!("  Instrument: {}", engine_config.instrument);
        info!("  Timeframe: {}", engine_config.timeframe);
        info!(
            "  Candle buffers: live={} historical={}",
            engine_config.candles.live, engine_config.candles.historical
        );
        info!(
            "  Periods: RSI={} ADX={}",
            engine_config.rsi_period, engine_config.adx_period
        );

        Ok(engine_config)
    }

    /// Validates the configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.instrument.trim().is_empty() {
            return Err(ConfigError::Message(
                "Instrument cannot be empty".to_string(),
            ));
        }

        for (name, value) in [
            ("candles.live", self.candles.live),
            ("candles.historical", self.candles.historical),
            ("indicators.live", self.indicators.live),
            ("indicators.historical", self.indicators.historical),
            ("rsi_period", self.rsi_period),
            ("adx_period", self.adx_period),
            ("queue_capacity", self.queue_capacity),
        ] {
            if value == 0 {
                return Err(ConfigError::Message(format!(
                    "{name} must be greater than 0"
                )));
            }
        }

        if self.candles.live > self.candles.historical {
            return Err(ConfigError::Message(
                "Live candle capacity cannot exceed historical capacity".to_string(),
            ));
        }

        if self.recheck_interval_ms == 0 {
            return Err(ConfigError::Message(
                "Recheck interval must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn recheck_interval(&self) -> Duration {
        Duration::from_millis(self.recheck_interval_ms)
    }

    pub fn actuality_margin(&self) -> TimeDelta {
        i64::try_from(self.actuality_margin_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX)
    }
}
