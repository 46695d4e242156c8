//! Tracing setup: a daily log file under `~/.forge/logs`, plus stderr for the CLI.

use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::ForgeConfig;

const LOG_FILE_PREFIX: &str = "forge";

/// Pipeline crates log at debug regardless of the base level.
const CRATE_DIRECTIVES: &str = "forge_chain=debug,forge_app=debug";

/// Filter directives for a configured base `level`.
pub fn directives(level: &str) -> String {
    format!("{},{CRATE_DIRECTIVES}", level.trim())
}

/// `RUST_LOG` when set, otherwise [`directives`] for `level`.
pub fn env_filter(level: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(directives(level)).with_context(|| format!("invalid log level {level:?}"))
}

/// Log to `~/.forge/logs` and stderr. Keep the guard alive until exit.
pub fn init_logging(level: &str) -> Result<WorkerGuard> {
    install(&ForgeConfig::logs_dir()?, env_filter(level)?, true)
}

/// Log to `logs_dir` only, with `filter` as the fallback directives.
pub fn init_logging_to_dir(logs_dir: &Path, filter: &str) -> Result<WorkerGuard> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(from_env) => from_env,
        Err(_) => EnvFilter::try_new(filter).with_context(|| format!("invalid filter {filter:?}"))?,
    };
    install(logs_dir, filter, false)
}

fn install(logs_dir: &Path, filter: EnvFilter, console: bool) -> Result<WorkerGuard> {
    std::fs::create_dir_all(logs_dir)
        .with_context(|| format!("Failed to create {}", logs_dir.display()))?;
    let appender = tracing_appender::rolling::daily(logs_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let file_layer = fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .with_writer(writer);
    let console_layer = console.then(|| {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .compact()
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .context("a global tracing subscriber is already installed")?;

    Ok(guard)
}
