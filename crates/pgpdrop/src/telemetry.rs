//! Logging setup for one invocation.
//!
//! Every invocation writes its own file under the log directory, named by
//! start time and pid, so concurrent invocations never interleave lines.
//! Warnings and errors are mirrored to stderr.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Local};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::error::PgpdropError;

pub const LOG_FILE_PREFIX: &str = "pgpdrop_";
pub const LOG_FILE_SUFFIX: &str = ".log";

/// `pgpdrop_<YYYYmmdd_HHMMSS_mmm>_<pid>.log`
pub fn invocation_log_name(now: DateTime<Local>, pid: u32) -> String {
    format!(
        "{}{}_{}{}",
        LOG_FILE_PREFIX,
        now.format("%Y%m%d_%H%M%S_%3f"),
        pid,
        LOG_FILE_SUFFIX
    )
}

/// Installs the global subscriber and routes `log` records into it.
/// Returns the path of this invocation's log file.
///
/// The file filter honours `RUST_LOG` and defaults to `info`.
pub fn init_invocation_log(log_directory: &Path) -> Result<PathBuf, PgpdropError> {
    let path = log_directory.join(invocation_log_name(Local::now(), std::process::id()));
    let file = open_log_file(&path)
        .map_err(|e| PgpdropError::Telemetry(format!("cannot open {}: {}", path.display(), e)))?;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .with_thread_ids(true)
        .with_filter(env_filter);

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .with_filter(LevelFilter::WARN);

    let subscriber = tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer);

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| PgpdropError::Telemetry(format!("failed to set subscriber: {}", e)))?;
    tracing_log::LogTracer::init()
        .map_err(|e| PgpdropError::Telemetry(format!("failed to bridge log records: {}", e)))?;

    Ok(path)
}

fn open_log_file(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}
