//! Engine error types
//!
//! Folding, previewing and reconciling never fail; errors only come from the
//! edges: configuration, the event bus and worker threads.

use event_bus::EventBusError;
use thiserror::Error;

/// Indicator engine errors
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Event bus error: {0}")]
    Bus(#[from] EventBusError),

    #[error("Failed to spawn worker {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker {0} panicked")]
    WorkerPanicked(String),
}

/// Type alias for engine results
pub type EngineResult<T> = Result<T, EngineError>;
