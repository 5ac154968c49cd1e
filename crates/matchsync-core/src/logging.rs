//! Tracing subscriber setup for hosts embedding the engine.

use std::io;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// File name prefix of the daily-rolled log files.
const LOG_FILE_PREFIX: &str = "matchsync.log";

/// Initialize the tracing subscriber.
///
/// Logs go to stderr, filtered by `RUST_LOG` (default `warn`). With a
/// `log_dir`, they are also written to a daily-rolled file there; keep the
/// returned guard alive until exit so buffered lines get flushed.
///
/// Calling this again after a subscriber is installed is a no-op.
pub fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    let installed = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .try_init()
        .is_ok();
    if installed {
        tracing::debug!(file = log_dir.is_some(), "Tracing initialized");
    }
    guard
}
