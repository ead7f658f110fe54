//! # Logging Setup
//!
//! Console logging for every binary, with an optional plain-text file
//! sink at an independent level for the deduper and merger. Console
//! output goes to stderr so stdout stays a clean data channel for the
//! applicators.

use anyhow::{bail, Context, Result};
use std::fs::File;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// Parse a level name as accepted on the command line.
pub fn parse_level(name: &str) -> Result<LevelFilter> {
    match name {
        "off" => Ok(LevelFilter::OFF),
        "trace" => Ok(LevelFilter::TRACE),
        "debug" => Ok(LevelFilter::DEBUG),
        "info" => Ok(LevelFilter::INFO),
        "warn" | "warning" => Ok(LevelFilter::WARN),
        "error" => Ok(LevelFilter::ERROR),
        other => bail!("unknown log level: {}", other),
    }
}

/// Install a console subscriber at `console_level`.
pub fn init_console(console_level: LevelFilter) -> Result<()> {
    tracing_subscriber::registry()
        .with(console_layer(console_level))
        .try_init()
        .context("failed to install the log subscriber")
}

/// Install a console subscriber plus a file sink at its own level.
///
/// The file is truncated, matching a fresh run's log.
pub fn init_with_file(
    console_level: LevelFilter,
    log_path: &Path,
    file_level: LevelFilter,
) -> Result<()> {
    let file = File::create(log_path)
        .with_context(|| format!("failed to create log file: {}", log_path.display()))?;
    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .with_filter(file_level);

    tracing_subscriber::registry()
        .with(console_layer(console_level))
        .with(file_layer)
        .try_init()
        .context("failed to install the log subscriber")
}

fn console_layer<S>(level: LevelFilter) -> impl Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(level)
}
