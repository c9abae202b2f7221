//! Logging Infrastructure
//!
//! Every component logs through `tracing`; the subscriber installed here is
//! the only sink. `RUST_LOG` takes precedence over the configured level.

use std::path::Path;

use tracing_subscriber::EnvFilter;

/// Initialize the logger (stderr, info)
pub fn init_logger() {
    init_logger_with_file(None, false, None);
}

/// Initialize the logger with optional JSON format and daily rolling file output
///
/// A missing log directory is created; if that fails, output stays on the
/// terminal.
pub fn init_logger_with_file(log_level: Option<&str>, json: bool, log_dir: Option<&str>) {
    let level = log_level.unwrap_or("info");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_target(false);

    let file_appender = log_dir.and_then(|dir| {
        let path = Path::new(dir);
        std::fs::create_dir_all(path).ok()?;
        Some(tracing_appender::rolling::daily(path, "nook-spooler"))
    });

    // A second init (tests, embedding) keeps the first subscriber
    let _ = match (file_appender, json) {
        (Some(appender), true) => subscriber
            .json()
            .with_ansi(false)
            .with_writer(appender)
            .try_init(),
        (Some(appender), false) => subscriber.with_ansi(false).with_writer(appender).try_init(),
        (None, true) => subscriber.json().with_writer(std::io::stderr).try_init(),
        (None, false) => subscriber.with_writer(std::io::stderr).try_init(),
    };
}
