//! Tracing setup for the indexing core.
//!
//! Output goes to stdout and to a daily-rolling file under the app's
//! log directory from `AppPaths`. The filter comes from `FOLIO_LOG`
//! (falling back to `RUST_LOG`), with chatty dependency crates capped
//! at warn by default so pipeline and retrieval logs stay readable.

use std::env;
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::AppPaths;

const LOG_FILE_PREFIX: &str = "folio-core.log";
const DEFAULT_DIRECTIVES: &str = "info,sqlx=warn,reqwest=warn,hyper=warn";

// The non-blocking writer flushes only while its guard is alive, so
// the guard lives for the process.
static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

fn filter_from_env() -> EnvFilter {
    let directives = env::var("FOLIO_LOG")
        .or_else(|_| env::var("RUST_LOG"))
        .unwrap_or_else(|_| DEFAULT_DIRECTIVES.to_string());
    EnvFilter::new(directives)
}

/// Install the global subscriber. Later calls are no-ops: the first
/// subscriber and its log directory win.
pub fn init(paths: &AppPaths) {
    let file_appender = tracing_appender::rolling::daily(&paths.log_dir, LOG_FILE_PREFIX);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    let stdout_layer = tracing_subscriber::fmt::layer().compact();
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);

    let _ = tracing_subscriber::registry()
        .with(filter_from_env())
        .with(stdout_layer)
        .with(file_layer)
        .try_init();
}
