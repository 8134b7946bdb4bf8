//! Tab-cycling prefix completion over a candidate vocabulary.
//!
//! The completer is a two-state machine. The first trigger snapshots the
//! input around the word under the cursor (prefix, word, suffix) and builds
//! the ordered candidate list; further triggers only cycle through that
//! list, so repeated cycling stays O(candidates) and cannot drift while the
//! visible text changes. The prefix and suffix are cut from the raw input at
//! the word's byte span, so `prefix + word + suffix` always reconstructs the
//! original text no matter how the word was quoted or spaced.

use std::ops::Range;

use tracing::debug;

use crate::cmdline::tokenize_spans;

// ============================================================================
// Types
// ============================================================================

/// Which way a cycle step moves through the candidate list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleDirection {
    Forward,
    Backward,
}

/// What the input surface should display after a completion step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionOutcome {
    /// Full replacement text.
    pub text: String,
    /// Byte offset of the cursor within `text`.
    pub cursor: usize,
    /// Appended tail to mark as selected, when the candidate is longer than
    /// the word it replaced. The next plain character overwrites it.
    pub selection: Option<Range<usize>>,
}

/// Session state captured at the first trigger and reused for every cycle.
#[derive(Debug, Clone)]
struct ActiveCompletion {
    /// Input text exactly as it was before the first candidate was applied.
    original: String,
    /// Raw text before the active word's span.
    prefix: String,
    /// Raw text after the active word's span.
    suffix: String,
    /// The active word, quotes and escapes removed.
    word: String,
    /// Prefix matches, sorted ascending. Non-empty while the session lives.
    candidates: Vec<String>,
    /// Current position in `candidates`.
    index: usize,
}

/// Prefix-completion engine for a single input surface.
#[derive(Debug, Clone, Default)]
pub struct Completer {
    active: Option<ActiveCompletion>,
}

// ============================================================================
// Completer
// ============================================================================

impl Completer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a completion session is in progress.
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Trigger or continue completion.
    ///
    /// On the first trigger the word under `cursor` is located, candidates
    /// are collected from `vocabulary` by case-insensitive prefix match and
    /// sorted ascending, and the first candidate is applied regardless of
    /// `direction`. While a session is active, each call steps `direction`
    /// through the stored candidates (wrapping at both ends) and the `text`,
    /// `cursor`, and `vocabulary` arguments are ignored.
    ///
    /// Returns `None` without changing state when there is nothing to
    /// complete: whitespace-only input, an empty active word, or no matching
    /// candidate.
    ///
    /// # Examples
    ///
    /// ```
    /// use cmdbar::completion::{Completer, CycleDirection};
    ///
    /// let vocab = vec!["alpha".to_string(), "alt".to_string(), "beta".to_string()];
    /// let mut completer = Completer::new();
    ///
    /// let out = completer
    ///     .complete("al", 2, CycleDirection::Forward, &vocab)
    ///     .unwrap();
    /// assert_eq!(out.text, "alpha");
    /// assert_eq!(out.cursor, 5);
    /// ```
    pub fn complete(
        &mut self,
        text: &str,
        cursor: usize,
        direction: CycleDirection,
        vocabulary: &[String],
    ) -> Option<CompletionOutcome> {
        if let Some(active) = self.active.as_mut() {
            let count = active.candidates.len();
            active.index = match direction {
                CycleDirection::Forward => (active.index + 1) % count,
                CycleDirection::Backward => (active.index + count - 1) % count,
            };
            return Some(Self::apply(active));
        }

        if text.trim().is_empty() {
            return None;
        }

        let (word, span) = word_at(text, cursor);
        if word.is_empty() {
            return None;
        }

        let folded = word.to_lowercase();
        let mut candidates: Vec<String> = vocabulary
            .iter()
            .filter(|v| v.to_lowercase().starts_with(&folded))
            .cloned()
            .collect();
        if candidates.is_empty() {
            debug!(word = %word, "No completion candidates");
            return None;
        }
        candidates.sort();

        let active = ActiveCompletion {
            original: text.to_string(),
            prefix: text[..span.start].to_string(),
            suffix: text[span.end..].to_string(),
            word,
            candidates,
            index: 0,
        };
        let outcome = Self::apply(&active);
        self.active = Some(active);
        Some(outcome)
    }

    /// Abandon the session and restore the pre-completion text.
    ///
    /// Returns `None` when no session is active, so the caller can fall
    /// through to whatever its cancel key otherwise does.
    pub fn cancel(&mut self) -> Option<CompletionOutcome> {
        let active = self.active.take()?;
        let cursor = active.original.len();
        Some(CompletionOutcome {
            text: active.original,
            cursor,
            selection: None,
        })
    }

    /// Drop the session, keeping whatever text is currently displayed.
    /// Called on any edit, navigation, or submission.
    pub fn reset(&mut self) {
        self.active = None;
    }

    fn apply(active: &ActiveCompletion) -> CompletionOutcome {
        let candidate = &active.candidates[active.index];
        let text = format!("{}{}{}", active.prefix, candidate, active.suffix);
        let cursor = active.prefix.len() + candidate.len();

        // Selection bounds must sit on char boundaries of the candidate.
        let tail = active.word.len();
        let selection = (candidate.len() > tail && candidate.is_char_boundary(tail))
            .then(|| active.prefix.len() + tail..active.prefix.len() + candidate.len());

        CompletionOutcome {
            text,
            cursor,
            selection,
        }
    }
}

/// Locate the word under `cursor` and its byte span in `text`.
///
/// Token selection walks offsets reconstructed by summing token lengths plus
/// one separator per boundary, cursor inclusive at both ends of a token;
/// when no token matches, the last token wins. Input that tokenizes to
/// nothing (bare quote pairs) is treated as one word spanning all of it.
fn word_at(text: &str, cursor: usize) -> (String, Range<usize>) {
    let mut tokens = tokenize_spans(text);
    if tokens.is_empty() {
        return (text.to_string(), 0..text.len());
    }

    let mut pos = 0usize;
    let mut picked = tokens.len() - 1;
    for (i, token) in tokens.iter().enumerate() {
        let start = pos;
        let end = pos + token.text.len();
        if (start..=end).contains(&cursor) {
            picked = i;
            break;
        }
        pos = end + 1;
    }

    let token = tokens.swap_remove(picked);
    (token.text, token.span)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab(entries: &[&str]) -> Vec<String> {
        entries.iter().map(|e| e.to_string()).collect()
    }

    #[test]
    fn test_first_trigger_selects_first_candidate() {
        let vocab = vocab(&["alpha", "alt", "beta"]);
        let mut completer = Completer::new();

        let out = completer
            .complete("al", 2, CycleDirection::Forward, &vocab)
            .expect("candidates for 'al'");
        assert_eq!(out.text, "alpha");
        assert_eq!(out.cursor, 5);
        assert_eq!(out.selection, Some(2..5));
        assert!(completer.is_active());
    }

    #[test]
    fn test_forward_cycle_wraps() {
        let vocab = vocab(&["alpha", "alt", "beta"]);
        let mut completer = Completer::new();

        completer.complete("al", 2, CycleDirection::Forward, &vocab);
        let out = completer
            .complete("alpha", 5, CycleDirection::Forward, &vocab)
            .expect("cycle");
        assert_eq!(out.text, "alt");

        let out = completer
            .complete("alt", 3, CycleDirection::Forward, &vocab)
            .expect("wrap");
        assert_eq!(out.text, "alpha");
    }

    #[test]
    fn test_backward_cycle_wraps_to_last() {
        let vocab = vocab(&["alpha", "alt", "beta"]);
        let mut completer = Completer::new();

        completer.complete("al", 2, CycleDirection::Forward, &vocab);
        let out = completer
            .complete("alpha", 5, CycleDirection::Backward, &vocab)
            .expect("cycle");
        assert_eq!(out.text, "alt");
    }

    #[test]
    fn test_first_trigger_ignores_direction() {
        let vocab = vocab(&["alpha", "alt"]);
        let mut completer = Completer::new();

        let out = completer
            .complete("al", 2, CycleDirection::Backward, &vocab)
            .expect("candidates");
        assert_eq!(out.text, "alpha");
    }

    #[test]
    fn test_candidates_sorted_ascending() {
        let vocab = vocab(&["beta", "alt", "alpha"]);
        let mut completer = Completer::new();

        let out = completer
            .complete("al", 2, CycleDirection::Forward, &vocab)
            .expect("candidates");
        assert_eq!(out.text, "alpha");
        let out = completer
            .complete("alpha", 5, CycleDirection::Forward, &vocab)
            .expect("cycle");
        assert_eq!(out.text, "alt");
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let vocab = vocab(&["Alpha"]);
        let mut completer = Completer::new();

        let out = completer
            .complete("al", 2, CycleDirection::Forward, &vocab)
            .expect("candidates");
        assert_eq!(out.text, "Alpha");
    }

    #[test]
    fn test_whitespace_only_input_rejected() {
        let vocab = vocab(&["alpha"]);
        let mut completer = Completer::new();

        assert_eq!(
            completer.complete("   ", 3, CycleDirection::Forward, &vocab),
            None
        );
        assert!(!completer.is_active());
    }

    #[test]
    fn test_no_match_rejected() {
        let vocab = vocab(&["alpha"]);
        let mut completer = Completer::new();

        assert_eq!(
            completer.complete("zz", 2, CycleDirection::Forward, &vocab),
            None
        );
        assert!(!completer.is_active());
    }

    #[test]
    fn test_empty_vocabulary_rejected() {
        let mut completer = Completer::new();
        assert_eq!(completer.complete("al", 2, CycleDirection::Forward, &[]), None);
    }

    #[test]
    fn test_completes_word_in_middle_of_line() {
        let vocab = vocab(&["alpha"]);
        let mut completer = Completer::new();

        // Cursor sits at the end of "al".
        let out = completer
            .complete("run al x", 6, CycleDirection::Forward, &vocab)
            .expect("candidates");
        assert_eq!(out.text, "run alpha x");
        assert_eq!(out.cursor, 9);
        assert_eq!(out.selection, Some(6..9));
    }

    #[test]
    fn test_cursor_past_all_tokens_falls_back_to_last() {
        let vocab = vocab(&["beta"]);
        let mut completer = Completer::new();

        let out = completer
            .complete("run b ", 6, CycleDirection::Forward, &vocab)
            .expect("candidates");
        assert_eq!(out.text, "run beta ");
    }

    #[test]
    fn test_multiple_spaces_preserved_in_prefix() {
        let vocab = vocab(&["beta"]);
        let mut completer = Completer::new();

        let out = completer
            .complete("a  b", 4, CycleDirection::Forward, &vocab)
            .expect("candidates");
        assert_eq!(out.text, "a  beta");
        assert_eq!(out.cursor, 7);
    }

    #[test]
    fn test_quoted_word_replaced_wholesale() {
        let vocab = vocab(&["alpha"]);
        let mut completer = Completer::new();

        let out = completer
            .complete("'al'", 4, CycleDirection::Forward, &vocab)
            .expect("candidates");
        assert_eq!(out.text, "alpha");
        assert_eq!(out.cursor, 5);
    }

    #[test]
    fn test_no_selection_when_candidate_equals_word() {
        let vocab = vocab(&["alt"]);
        let mut completer = Completer::new();

        let out = completer
            .complete("alt", 3, CycleDirection::Forward, &vocab)
            .expect("candidates");
        assert_eq!(out.text, "alt");
        assert_eq!(out.selection, None);
    }

    #[test]
    fn test_cancel_restores_original_text() {
        let vocab = vocab(&["alpha", "alt"]);
        let mut completer = Completer::new();

        completer.complete("run al", 6, CycleDirection::Forward, &vocab);
        completer.complete("run alpha", 9, CycleDirection::Forward, &vocab);

        let out = completer.cancel().expect("active session");
        assert_eq!(out.text, "run al");
        assert_eq!(out.cursor, 6);
        assert_eq!(out.selection, None);
        assert!(!completer.is_active());
    }

    #[test]
    fn test_cancel_when_inactive_returns_none() {
        let mut completer = Completer::new();
        assert_eq!(completer.cancel(), None);
    }

    #[test]
    fn test_reset_keeps_no_state() {
        let vocab = vocab(&["alpha"]);
        let mut completer = Completer::new();

        completer.complete("al", 2, CycleDirection::Forward, &vocab);
        completer.reset();
        assert!(!completer.is_active());
        assert_eq!(completer.cancel(), None);
    }

    #[test]
    fn test_cycle_after_reset_derives_fresh_word() {
        let vocab = vocab(&["alpha", "beta"]);
        let mut completer = Completer::new();

        completer.complete("al", 2, CycleDirection::Forward, &vocab);
        completer.reset();

        let out = completer
            .complete("be", 2, CycleDirection::Forward, &vocab)
            .expect("candidates");
        assert_eq!(out.text, "beta");
    }

    #[test]
    fn test_candidate_splices_at_raw_span_for_every_cursor() {
        // Each vocabulary entry extends one token by a fixed tail, so the
        // applied text identifies which token was chosen and the splice
        // point can be checked against that token's raw span.
        let inputs = ["a  b", "run 'x y' go", "héllo wörld"];

        for input in inputs {
            let spans = tokenize_spans(input);
            let vocab: Vec<String> =
                spans.iter().map(|t| format!("{}zz", t.text)).collect();

            for cursor in (0..=input.len()).filter(|i| input.is_char_boundary(*i)) {
                let mut completer = Completer::new();
                let out = completer
                    .complete(input, cursor, CycleDirection::Forward, &vocab)
                    .unwrap_or_else(|| {
                        panic!("no candidates at cursor {cursor} in {input:?}")
                    });

                let spliced_from_some_token = spans.iter().any(|token| {
                    let spliced = format!(
                        "{}{}zz{}",
                        &input[..token.span.start],
                        token.text,
                        &input[token.span.end..]
                    );
                    spliced == out.text
                });
                assert!(
                    spliced_from_some_token,
                    "apply produced {:?} at cursor {cursor} in {input:?}",
                    out.text
                );
            }
        }
    }
}
