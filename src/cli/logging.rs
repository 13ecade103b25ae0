// src/cli/logging.rs
use anyhow::{Context, Result, bail};
use std::path::Path;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub const LOG_LEVELS: [&str; 5] = ["none", "debug", "info", "warn", "error"];

/// Filter directive for a `--log-level` value.
pub fn filter_directive(level: &str) -> Result<String> {
    match level.to_lowercase().as_str() {
        "none" | "off" => Ok("off".to_string()),
        lvl @ ("debug" | "info" | "warn" | "error") => Ok(format!("{}={}", env!("CARGO_CRATE_NAME"), lvl)),
        other => bail!("invalid log level {:?}, expected one of: {}", other, LOG_LEVELS.join(", ")),
    }
}

/// Install the global subscriber. `RUST_LOG` takes precedence over `level`.
pub fn init_tracing(level: &str, log_file: Option<&Path>) -> Result<()> {
    let directive = filter_directive(level)?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| directive.into());

    let writer = match log_file {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            BoxMakeWriter::new(std::sync::Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(writer).with_ansi(log_file.is_none()))
        .try_init()
        .context("failed to initialise logging")?;
    Ok(())
}
