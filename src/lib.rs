//! cmdbar - the core of a quick-launch command bar.
//!
//! A single-line input surface over shell-like command text: a
//! quote/escape-aware tokenizer, tab-cycling prefix completion, persisted
//! session history, and a live file-backed alias store that resolves short
//! names to filesystem targets and hot-reloads when its file is edited
//! externally.

pub mod aliases;
pub mod cmdline;
pub mod completion;
pub mod config;
pub mod error;
pub mod history;
pub mod input;
pub mod logging;
pub mod watcher;
