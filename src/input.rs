//! Single-line input session: editing, tab completion, history navigation.
//!
//! [`InputSession`] is the state machine behind the command bar's text box.
//! It owns the displayed text, the cursor, the selection a completion leaves
//! behind, a [`Completer`], and a [`History`] buffer, and answers one
//! question per key event: what should the text, cursor, and selection be
//! now. Every operation is synchronous and runs on the caller's thread. The
//! session never talks to the alias store; it only sees alias names through
//! [`set_vocabulary`](InputSession::set_vocabulary), refreshed by whoever
//! consumes the store's change events.

use std::ops::Range;

use tracing::debug;

use crate::cmdline;
use crate::completion::{Completer, CycleDirection};
use crate::history::{History, HistoryDirection};

/// Characters that bound a word for word-wise deletion.
const WORD_DELIMITERS: &str = "/\\.,;:|!@#$%^&*()+=[]{}<>\"'~`? \t\n\r";

/// Outcome of a confirm keypress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submit {
    /// The raw line, ready for the dispatch layer.
    Line(String),
    /// The keypress accepted a pending completion tail; nothing was
    /// submitted and the completion session stays live.
    TailAccepted,
}

/// Editing state machine for a single-line command input.
///
/// # Examples
///
/// ```
/// use cmdbar::history::History;
/// use cmdbar::input::InputSession;
///
/// let mut session = InputSession::new(History::new("history.txt".into()));
/// session.set_vocabulary(vec!["docs".to_string()]);
/// session.insert("do");
/// assert!(session.complete_next());
/// assert_eq!(session.text(), "docs");
/// ```
#[derive(Debug)]
pub struct InputSession {
    text: String,
    /// Byte offset into `text`, always on a char boundary.
    cursor: usize,
    /// Tail of an applied candidate, pending acceptance or replacement.
    selection: Option<Range<usize>>,
    completer: Completer,
    history: History,
    vocabulary: Vec<String>,
}

impl InputSession {
    /// Create a session around an already-loaded history buffer.
    pub fn new(history: History) -> Self {
        InputSession {
            text: String::new(),
            cursor: 0,
            selection: None,
            completer: Completer::new(),
            history,
            vocabulary: Vec::new(),
        }
    }

    // ========================================================================
    // Completion
    // ========================================================================

    /// Trigger completion, or advance an active cycle.
    ///
    /// Returns `false` when there is nothing to complete, the caller's cue
    /// for an audible or visual no-match signal.
    pub fn complete_next(&mut self) -> bool {
        self.complete(CycleDirection::Forward)
    }

    /// Trigger completion, or step an active cycle backward.
    pub fn complete_prev(&mut self) -> bool {
        self.complete(CycleDirection::Backward)
    }

    fn complete(&mut self, direction: CycleDirection) -> bool {
        self.history.reset_cursor();
        match self
            .completer
            .complete(&self.text, self.cursor, direction, &self.vocabulary)
        {
            Some(outcome) => {
                self.text = outcome.text;
                self.cursor = outcome.cursor;
                self.selection = outcome.selection;
                true
            }
            None => false,
        }
    }

    /// Abandon an active completion, restoring the pre-completion text with
    /// the cursor at its end. Returns `false` when no completion was active,
    /// so the host can treat the keypress as "close".
    pub fn cancel(&mut self) -> bool {
        match self.completer.cancel() {
            Some(outcome) => {
                self.text = outcome.text;
                self.cursor = outcome.cursor;
                self.selection = outcome.selection;
                true
            }
            None => false,
        }
    }

    /// Whether a completion cycle is in progress.
    pub fn is_completing(&self) -> bool {
        self.completer.is_active()
    }

    // ========================================================================
    // History
    // ========================================================================

    /// Step through previously submitted lines.
    ///
    /// Ends any completion session first, keeping the displayed candidate as
    /// the in-flight text the history buffer parks. On a hit the entry
    /// becomes the text with the cursor at its end. Returns `false` when the
    /// history is empty.
    pub fn navigate_history(&mut self, direction: HistoryDirection) -> bool {
        self.completer.reset();
        self.selection = None;
        match self.history.navigate(direction, &self.text) {
            Some(entry) => {
                let entry = entry.to_string();
                self.cursor = entry.len();
                self.text = entry;
                true
            }
            None => false,
        }
    }

    // ========================================================================
    // Editing
    // ========================================================================

    /// Insert typed text at the cursor.
    ///
    /// A lone space while a completion is active accepts the applied
    /// candidate: the selection clears without deleting its text and the
    /// space goes in after it. Any other insertion replaces an active
    /// selection. Either way the completion session ends and history
    /// navigation resets.
    pub fn insert(&mut self, s: &str) {
        if s.is_empty() {
            return;
        }
        if s == " " && self.completer.is_active() {
            self.selection = None;
        }
        if let Some(sel) = self.selection.take() {
            self.text.replace_range(sel.clone(), s);
            self.cursor = sel.start + s.len();
        } else {
            self.text.insert_str(self.cursor, s);
            self.cursor += s.len();
        }
        self.after_edit();
    }

    /// Delete the selection if one is pending, otherwise the char before the
    /// cursor.
    pub fn backspace(&mut self) {
        if let Some(sel) = self.selection.take() {
            self.text.replace_range(sel.clone(), "");
            self.cursor = sel.start;
        } else if self.cursor > 0 {
            let start = self.prev_boundary(self.cursor);
            self.text.replace_range(start..self.cursor, "");
            self.cursor = start;
        }
        self.after_edit();
    }

    /// Delete the selection if one is pending, otherwise the char after the
    /// cursor.
    pub fn delete_forward(&mut self) {
        if let Some(sel) = self.selection.take() {
            self.text.replace_range(sel.clone(), "");
            self.cursor = sel.start;
        } else if self.cursor < self.text.len() {
            let end = self.next_boundary(self.cursor);
            self.text.replace_range(self.cursor..end, "");
        }
        self.after_edit();
    }

    /// Word-wise deletion (Ctrl+Backspace).
    ///
    /// A pending selection is removed first. Then the walk runs back from
    /// the cursor over any run of delimiters and on through the word until
    /// the previous delimiter, deleting everything crossed.
    pub fn delete_word_back(&mut self) {
        if let Some(sel) = self.selection.take() {
            self.text.replace_range(sel.clone(), "");
            self.cursor = sel.start;
        }
        if self.cursor > 0 {
            let mut start = 0;
            let mut seen_word = false;
            for (i, c) in self.text[..self.cursor].char_indices().rev() {
                if is_delimiter(c) {
                    if seen_word {
                        start = i + c.len_utf8();
                        break;
                    }
                } else {
                    seen_word = true;
                }
            }
            self.text.replace_range(start..self.cursor, "");
            self.cursor = start;
        }
        self.after_edit();
    }

    // ========================================================================
    // Cursor movement
    // ========================================================================

    /// Move the cursor one char left, collapsing a selection to its start.
    /// Ends any completion session.
    pub fn move_left(&mut self) {
        self.completer.reset();
        if let Some(sel) = self.selection.take() {
            self.cursor = sel.start;
        } else if self.cursor > 0 {
            self.cursor = self.prev_boundary(self.cursor);
        }
    }

    /// Move the cursor one char right. With a pending selection this accepts
    /// the candidate and jumps to the end of the whole text. Ends any
    /// completion session.
    pub fn move_right(&mut self) {
        self.completer.reset();
        if self.selection.take().is_some() {
            self.cursor = self.text.len();
        } else if self.cursor < self.text.len() {
            self.cursor = self.next_boundary(self.cursor);
        }
    }

    // ========================================================================
    // Confirmation
    // ========================================================================

    /// Handle the confirm key.
    ///
    /// With a pending selection the tail is accepted instead: the selection
    /// clears, the cursor lands after it, and the completion session stays
    /// live so a further trigger keeps cycling. Otherwise the line goes into
    /// history and comes back as [`Submit::Line`] for the dispatch layer.
    pub fn confirm(&mut self) -> Submit {
        if let Some(sel) = self.selection.take() {
            self.cursor = sel.end;
            return Submit::TailAccepted;
        }
        let line = self.text.clone();
        self.history.append(&line);
        self.after_edit();
        debug!(line = %line, "Line confirmed");
        Submit::Line(line)
    }

    // ========================================================================
    // Text and vocabulary
    // ========================================================================

    /// Replace the whole text, cursor at the end. Ends completion and
    /// history navigation.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.cursor = self.text.len();
        self.selection = None;
        self.after_edit();
    }

    /// Swap in a new candidate vocabulary. An active completion keeps the
    /// candidate list it captured at trigger time.
    pub fn set_vocabulary(&mut self, vocabulary: Vec<String>) {
        self.vocabulary = vocabulary;
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Cursor byte offset into [`text`](Self::text).
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Pending completion-tail selection, if any.
    pub fn selection(&self) -> Option<Range<usize>> {
        self.selection.clone()
    }

    /// The current text split into shell-style tokens.
    pub fn tokens(&self) -> Vec<String> {
        cmdline::tokenize(&self.text)
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut History {
        &mut self.history
    }

    fn after_edit(&mut self) {
        self.completer.reset();
        self.history.reset_cursor();
    }

    fn prev_boundary(&self, at: usize) -> usize {
        self.text[..at]
            .char_indices()
            .next_back()
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    fn next_boundary(&self, at: usize) -> usize {
        self.text[at..]
            .chars()
            .next()
            .map(|c| at + c.len_utf8())
            .unwrap_or(self.text.len())
    }
}

fn is_delimiter(c: char) -> bool {
    WORD_DELIMITERS.contains(c)
}

#[cfg(test)]
#[path = "input_tests.rs"]
mod tests;
