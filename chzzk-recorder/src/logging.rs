//! Console + daily-rotated-file tracing subscriber.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::error::{AppError, Result};

/// Local-timezone timestamp formatter so a multi-hour run's logs line up with the
/// operator's clock rather than UTC.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Initialize the global tracing subscriber. `console_level` drives the console
/// layer's `EnvFilter`; the file layer writes to `<log_dir>/<YYYYMMDD>/recorder.log`
/// (today's date at startup) and always captures `debug` and above regardless of the
/// console filter.
///
/// Returns a `WorkerGuard` that must be kept alive for the process lifetime so
/// buffered file writes are flushed on shutdown.
pub fn init_logging(log_dir: &Path, console_level: &str) -> Result<WorkerGuard> {
    let day_dir = log_dir.join(chrono::Local::now().format("%Y%m%d").to_string());
    std::fs::create_dir_all(&day_dir)
        .map_err(|e| AppError::config(format!("creating log directory {}: {e}", day_dir.display())))?;

    let console_filter = EnvFilter::try_new(console_level)
        .map_err(|e| AppError::config(format!("invalid logLevel {console_level:?}: {e}")))?;

    let file_appender = tracing_appender::rolling::never(&day_dir, "recorder.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_ansi(true)
        .with_timer(LocalTimer)
        .with_filter(console_filter);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_timer(LocalTimer)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| AppError::config(format!("failed to set global tracing subscriber: {e}")))?;

    Ok(guard)
}
