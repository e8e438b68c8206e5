//! Indicator Stream CLI
//!
//! Replays recorded candles through the RSI/ADX engine and prints the
//! resulting indicator series as JSON.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicator_engine::EngineConfig;
use indicator_stream::replay::{load_candles, run_replay, ReplayOptions};
use time_series::Timeframe;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (TOML, YAML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a JSON array of candles and print RSI/ADX
    Replay {
        /// Candle file
        #[arg(long)]
        candles: PathBuf,

        /// Override the configured timeframe (1m, 5m, 15m, 1H, 4H, 1D, 1W)
        #[arg(long)]
        timeframe: Option<Timeframe>,

        /// Leading candles restored as history before ticking the rest
        #[arg(long, default_value_t = 0)]
        history: usize,

        /// Only print the last N points of each indicator
        #[arg(long)]
        tail: Option<usize>,

        /// Pretty-print the report
        #[arg(long)]
        pretty: bool,
    },
    /// Print the effective configuration
    Config,
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    init_tracing(&args.log_level, args.json_logs)?;
    info!("📈 Starting Indicator Stream v{}", indicator_stream::VERSION);

    let mut config =
        EngineConfig::load(args.config.as_deref()).context("failed to load configuration")?;

    match args.command {
        Command::Replay {
            candles,
            timeframe,
            history,
            tail,
            pretty,
        } => {
            if let Some(timeframe) = timeframe {
                config.timeframe = timeframe;
            }
            let candles = load_candles(&candles)?;
            let report = run_replay(config, candles, ReplayOptions { history, tail })?;
            print_json(&report, pretty)?;
        }
        Command::Config => print_json(&config, true)?,
    }

    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<()> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{out}");
    Ok(())
}

/// Logs go to stderr so stdout carries only the report.
fn init_tracing(log_level: &str, json: bool) -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let level_filter = match log_level.to_lowercase().as_str() {
        "debug" => tracing::Level::DEBUG,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        "trace" => tracing::Level::TRACE,
        _ => tracing::Level::INFO,
    };
    let filter = || EnvFilter::from_default_env().add_directive(level_filter.into());

    let layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_writer(std::io::stderr)
            .with_filter(filter())
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(filter())
            .boxed()
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .context("failed to initialise tracing")?;
    Ok(())
}
