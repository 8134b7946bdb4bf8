//! Structured JSONL logging with human-readable stderr output.
//!
//! Dual-output logging:
//! - **JSONL to file** (~/.cmdbar/logs/cmdbar.jsonl) - structured, grep/jq friendly
//! - **Compact to stderr** - human-readable for interactive use
//!
//! # Usage
//!
//! ```rust,ignore
//! use cmdbar::logging;
//!
//! // Initialize logging - MUST keep guard alive for duration of program
//! let _guard = logging::init();
//!
//! // Use tracing macros directly
//! tracing::info!(event_type = "app_start", "Application started");
//! ```
//!
//! # JSONL Output Format
//!
//! Each line is a valid JSON object:
//! ```json
//! {"timestamp":"2024-12-25T10:30:45.123Z","level":"INFO","target":"cmdbar::aliases","message":"Loaded aliases","fields":{"alias_count":12}}
//! ```

use std::fs::{self, OpenOptions};
use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config;

const LOG_FILE: &str = "cmdbar.jsonl";

/// Guard that must be kept alive for the duration of the program.
/// Dropping this guard will flush and close the log file.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Initialize the dual-output logging system.
///
/// Returns a guard that MUST be kept alive for the duration of the program.
/// Dropping the guard will flush remaining logs and close the file. When the
/// log file cannot be opened, logging falls back to stderr only.
pub fn init() -> LoggingGuard {
    let log_dir = config::log_dir();
    if let Err(e) = fs::create_dir_all(&log_dir) {
        eprintln!("[LOGGING] Failed to create log directory: {}", e);
    }
    let file_path = log_dir.join(LOG_FILE);

    // Environment filter - default to info, allow override via RUST_LOG
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,notify=warn"));

    // Compact layer for stderr (human developers)
    let pretty_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(false)
        .compact();

    let (json_layer, file_guard) = match OpenOptions::new()
        .create(true)
        .append(true)
        .open(&file_path)
    {
        Ok(file) => {
            // Non-blocking writer keeps file I/O off the foreground thread.
            let (non_blocking_file, guard) = tracing_appender::non_blocking(file);
            let layer = fmt::layer()
                .json()
                .with_writer(non_blocking_file)
                .with_timer(fmt::time::UtcTime::rfc_3339())
                .with_target(true)
                .with_level(true)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_file(false)
                .with_line_number(false)
                .with_span_events(FmtSpan::NONE);
            (Some(layer), Some(guard))
        }
        Err(e) => {
            eprintln!("[LOGGING] Failed to open log file, stderr only: {}", e);
            (None, None)
        }
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(pretty_layer)
        .init();

    tracing::info!(
        event_type = "app_lifecycle",
        action = "started",
        log_path = %file_path.display(),
        "Logging initialized"
    );

    LoggingGuard {
        _file_guard: file_guard,
    }
}

/// Get the path to the JSONL log file.
pub fn log_path() -> PathBuf {
    config::log_dir().join(LOG_FILE)
}
