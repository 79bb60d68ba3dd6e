//! Logging initialization.
//!
//! Console logging is always on; file logging is opt-in and writes daily
//! rolled files through a non-blocking appender. The appender guard lives in
//! a process-wide static so buffered lines flush at exit.

use std::path::Path;
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env("SCENEDEX_LOG").unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initializes console logging. Safe to call once per process.
pub fn init() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Initializes console logging plus a daily rolling log file in `log_dir`.
pub fn init_with_file(log_dir: &Path) {
    let file_appender = tracing_appender::rolling::daily(log_dir, "scenedex.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let _ = FILE_GUARD.set(guard);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false),
        )
        .init();
}
