//! Logging configuration for GeoRank

use std::ffi::OsStr;
use std::path::Path;

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::{self};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Registry;

use crate::Result;

const LOG_DIR: &str = "logs";
const LOG_FILE_PREFIX: &str = "georank.log";
const BACKTRACE_VAR: &str = "RUST_BACKTRACE";

/// Initialize logging system with file output
pub fn init_logging() -> Result<()> {
    init_logging_with_config(None)
}

/// Initialize logging with configuration
pub fn init_logging_with_config(config: Option<&crate::config::AppConfig>) -> Result<()> {
    let filter = config.map_or_else(
        || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,georank=debug")),
        |config| level_filter(&config.logging.level),
    );
    let level = config.map_or("info", |c| c.logging.level.as_str());

    let backtrace = config.is_some_and(|c| c.logging.backtrace);
    if let Some(value) = backtrace_setting(backtrace, std::env::var_os(BACKTRACE_VAR).as_deref()) {
        std::env::set_var(BACKTRACE_VAR, value);
    }

    install(filter, level)
}

/// Value to export for `RUST_BACKTRACE`; an explicit environment setting wins
fn backtrace_setting(enabled: bool, current: Option<&OsStr>) -> Option<&'static str> {
    (enabled && current.is_none()).then_some("1")
}

/// Initialize logging with custom log level
pub fn init_logging_with_level(level: &str) -> Result<()> {
    install(level_filter(level), level)
}

/// Initialize simple logging for testing
pub fn init_simple_logging() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_max_level(tracing::Level::INFO)
        .try_init()
        .map_err(|e| crate::GeoRankError::Custom(format!("Logging already initialized: {e}")))?;

    tracing::info!("Simple logging initialized");
    Ok(())
}

fn level_filter(level: &str) -> EnvFilter {
    EnvFilter::new(format!("{level},georank={level}"))
}

fn install(env_filter: EnvFilter, level: &str) -> Result<()> {
    let logs_dir = Path::new(LOG_DIR);
    if !logs_dir.exists() {
        std::fs::create_dir_all(logs_dir)?;
    }

    let file_appender = tracing_appender::rolling::daily(LOG_DIR, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr);

    let file_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(non_blocking)
        .with_ansi(false);

    Registry::default()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| crate::GeoRankError::Custom(format!("Logging already initialized: {e}")))?;

    tracing::info!("Logging initialized with level: {} - console and file output enabled", level);
    tracing::info!("Log files will be saved to: {}/{}.YYYY-MM-DD", LOG_DIR, LOG_FILE_PREFIX);

    // The writer thread must outlive every subscriber call
    std::mem::forget(guard);

    Ok(())
}
