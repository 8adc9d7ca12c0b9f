use anyhow::Result;
use std::fs;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// # Setup Logging
///
/// Configures the global `tracing` subscriber:
/// - Level from `RUST_LOG` when set, otherwise `log_level`.
/// - Human-readable console output with ANSI colors.
/// - JSON lines in a daily rotating file `<log_dir>/<file_prefix>.YYYY-MM-DD`.
///
/// Records emitted through the `log` facade (the engine library) are bridged
/// into the same subscriber.
///
/// The returned guard flushes the non-blocking file writer when dropped and
/// must be held for the lifetime of the process.
pub fn setup_logging(log_dir: &Path, log_level: &str, file_prefix: &str) -> Result<WorkerGuard> {
    fs::create_dir_all(log_dir)?;

    let file_appender = rolling::daily(log_dir, file_prefix);
    let (non_blocking_appender, guard) = non_blocking(file_appender);

    let console_layer = fmt::layer().with_target(true).with_ansi(true);
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(non_blocking_appender)
        .json();

    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(log_level))?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    tracing::info!("Logging initialized with level: {}", log_level);
    Ok(guard)
}
