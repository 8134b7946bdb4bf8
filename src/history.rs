//! Persisted command history.
//!
//! The buffer is most-recent-first and capacity-bounded. Submitting a line
//! that already exists (case-insensitively) moves it back to the front
//! instead of duplicating it. On disk the history is newline-delimited plain
//! text in the same most-recent-first order the buffer keeps in memory, so
//! chronology survives restarts.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::{debug, info, instrument};

/// Maximum number of entries kept in memory and on disk.
pub const HISTORY_LIMIT: usize = 100;

/// Direction of a history navigation step.
///
/// The buffer is most-recent-first, so `Older` steps toward higher indices
/// and `Newer` back toward the front.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryDirection {
    Older,
    Newer,
}

impl HistoryDirection {
    fn step(self) -> i64 {
        match self {
            HistoryDirection::Older => 1,
            HistoryDirection::Newer => -1,
        }
    }
}

/// Bounded, de-duplicating, most-recent-first command history.
#[derive(Debug, Clone)]
pub struct History {
    /// Entries, most recent first.
    entries: Vec<String>,
    /// Navigation cursor; `None` when not navigating.
    cursor: Option<usize>,
    /// Backing file.
    path: PathBuf,
    /// Capacity bound, [`HISTORY_LIMIT`] unless overridden for tests.
    limit: usize,
}

impl History {
    /// Create an empty history backed by `path`, with the default capacity.
    pub fn new(path: PathBuf) -> Self {
        Self::with_limit(path, HISTORY_LIMIT)
    }

    /// Create an empty history with a custom capacity (for testing).
    pub fn with_limit(path: PathBuf, limit: usize) -> Self {
        History {
            entries: Vec::new(),
            cursor: None,
            path,
            limit,
        }
    }

    /// Record a submitted line at the front of the buffer.
    ///
    /// Blank lines are ignored. A case-insensitive duplicate anywhere in the
    /// buffer is removed first, so the entry moves to the front rather than
    /// appearing twice. Once the buffer is full the oldest entries are
    /// evicted.
    pub fn append(&mut self, entry: &str) {
        if entry.trim().is_empty() {
            debug!("Ignoring blank history entry");
            return;
        }
        let folded = entry.to_lowercase();
        self.entries.retain(|e| e.to_lowercase() != folded);
        self.entries.insert(0, entry.to_string());
        self.truncate_to_limit();
    }

    /// Step through the history and return the entry to display.
    ///
    /// Returns `None` when the buffer is empty (the caller's no-op signal).
    /// On the first step from a non-navigating state, non-blank in-flight
    /// text is parked at the front of the buffer so the user can navigate
    /// back to it. The cursor clamps at both ends.
    pub fn navigate(&mut self, direction: HistoryDirection, current: &str) -> Option<&str> {
        if self.entries.is_empty() {
            return None;
        }

        let base = match self.cursor {
            Some(i) => i as i64,
            None if !current.trim().is_empty() => {
                self.entries.insert(0, current.to_string());
                self.truncate_to_limit();
                0
            }
            None => -1,
        };

        let last = (self.entries.len() - 1) as i64;
        let idx = (base + direction.step()).clamp(0, last) as usize;
        self.cursor = Some(idx);
        self.entries.get(idx).map(|s| s.as_str())
    }

    /// Leave navigation mode. Called on any edit, completion, or submission.
    pub fn reset_cursor(&mut self) {
        self.cursor = None;
    }

    /// Whether a navigation is in progress.
    pub fn is_navigating(&self) -> bool {
        self.cursor.is_some()
    }

    /// Load entries from the backing file.
    ///
    /// A missing file leaves the buffer empty; a file longer than the
    /// capacity is clamped to the newest entries.
    #[instrument(name = "history_load", skip(self))]
    pub fn load(&mut self) -> Result<()> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "History file not found, starting empty");
            return Ok(());
        }

        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read history file: {}", self.path.display()))?;

        self.entries = content
            .lines()
            .take(self.limit)
            .map(|l| l.to_string())
            .collect();
        self.cursor = None;

        info!(
            path = %self.path.display(),
            entry_count = self.entries.len(),
            "Loaded history"
        );
        Ok(())
    }

    /// Write entries to the backing file, newest first, capped at capacity.
    #[instrument(name = "history_save", skip(self))]
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let mut out = String::new();
        for entry in self.entries.iter().take(self.limit) {
            out.push_str(entry);
            out.push('\n');
        }

        std::fs::write(&self.path, &out)
            .with_context(|| format!("Failed to write history file: {}", self.path.display()))?;

        debug!(
            path = %self.path.display(),
            entry_count = self.entries.len().min(self.limit),
            "Saved history"
        );
        Ok(())
    }

    /// Entries in buffer order, most recent first.
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn truncate_to_limit(&mut self) {
        if self.entries.len() > self.limit {
            self.entries.truncate(self.limit);
        }
    }
}
