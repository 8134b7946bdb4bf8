use thiserror::Error;
use tracing::{error, warn};

/// Domain-specific errors for the command bar.
///
/// Nothing here is fatal: every failure path degrades to operating on empty
/// or last-known-good state, so these exist for logging and for callers that
/// want to branch on the failure kind.
#[derive(Error, Debug)]
pub enum CmdbarError {
    #[error("File watch error: {0}")]
    FileWatch(String),

    #[error("Failed to persist {path}: {source}")]
    Persist {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed alias document: {0}")]
    MalformedAliases(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, CmdbarError>;

/// Extension trait for silent error logging with caller location tracking.
/// Use when the operation is recoverable and the caller keeps going.
///
/// # Examples
///
/// ```ignore
/// use cmdbar::error::ResultExt;
///
/// // Log and continue with defaults if the history file is unreadable.
/// let content = std::fs::read_to_string(&path).warn_on_err();
///
/// // Log a failed save; in-memory state stays authoritative.
/// store.save().log_err();
/// ```
pub trait ResultExt<T> {
    /// Log error with caller location and return None. Use for recoverable failures.
    fn log_err(self) -> Option<T>;
    /// Log as warning with caller location and return None. Use for expected failures.
    fn warn_on_err(self) -> Option<T>;
}

impl<T, E: std::fmt::Debug> ResultExt<T> for std::result::Result<T, E> {
    #[track_caller]
    fn log_err(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(err) => {
                let caller = std::panic::Location::caller();
                error!(
                    error = ?err,
                    file = caller.file(),
                    line = caller.line(),
                    "Operation failed"
                );
                None
            }
        }
    }

    #[track_caller]
    fn warn_on_err(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(err) => {
                let caller = std::panic::Location::caller();
                warn!(
                    error = ?err,
                    file = caller.file(),
                    line = caller.line(),
                    "Operation had warning"
                );
                None
            }
        }
    }
}
