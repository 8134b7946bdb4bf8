//! Shell-style command line splitting.
//!
//! This is the minimal quoting/escaping subset the command bar understands,
//! not a full shell grammar:
//! - Tokens are separated by unquoted spaces; runs of spaces collapse.
//! - `'...'` and `"..."` group spaces into one token. A quote character of
//!   the other kind is literal inside a quoted segment.
//! - `\` escapes the next character (any character, including quotes and
//!   spaces). A trailing backslash is dropped.
//! - Unterminated quotes and dangling escapes are tolerated silently.
//!
//! Quote and escape characters never survive into token text. Callers that
//! need to know where a token came from in the raw input (the completion
//! engine does) use [`tokenize_spans`], which reports the byte range each
//! token was consumed from, including its quote/escape characters.

use std::ops::Range;

/// A token plus the raw byte range it was consumed from.
///
/// The span covers every character that contributed to the token, quotes and
/// escape backslashes included, and always falls on UTF-8 boundaries. For
/// any input, slicing the spans out of it and keeping the text between them
/// reconstructs the input exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Token text with quoting/escaping resolved.
    pub text: String,
    /// Byte range in the source string, quote/escape characters included.
    pub span: Range<usize>,
}

/// Split a command line into tokens.
///
/// # Examples
///
/// ```
/// use cmdbar::cmdline::tokenize;
///
/// assert_eq!(tokenize("run 'a b' c"), vec!["run", "a b", "c"]);
/// assert_eq!(tokenize("   "), Vec::<String>::new());
/// ```
pub fn tokenize(input: &str) -> Vec<String> {
    tokenize_spans(input).into_iter().map(|t| t.text).collect()
}

/// Split a command line into tokens with their raw source spans.
///
/// Same scan as [`tokenize`]; see the module docs for the grammar.
pub fn tokenize_spans(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    // Start of the raw range feeding `current`; None until a character is
    // consumed for the pending token.
    let mut span_start: Option<usize> = None;
    let mut span_end = 0usize;
    let mut in_single_quote = false;
    let mut in_double_quote = false;
    let mut escape_next = false;

    for (idx, ch) in input.char_indices() {
        let ch_end = idx + ch.len_utf8();

        if escape_next {
            current.push(ch);
            span_end = ch_end;
            escape_next = false;
            continue;
        }

        match ch {
            '\\' => {
                escape_next = true;
                span_start.get_or_insert(idx);
                span_end = ch_end;
            }
            '\'' => {
                if in_double_quote {
                    current.push(ch);
                } else {
                    in_single_quote = !in_single_quote;
                }
                span_start.get_or_insert(idx);
                span_end = ch_end;
            }
            '"' => {
                if in_single_quote {
                    current.push(ch);
                } else {
                    in_double_quote = !in_double_quote;
                }
                span_start.get_or_insert(idx);
                span_end = ch_end;
            }
            ' ' => {
                if in_single_quote || in_double_quote {
                    current.push(ch);
                    span_end = ch_end;
                } else {
                    // Separator. Flush a non-empty token; a pending span with
                    // no text (e.g. an empty quoted pair) is discarded.
                    if !current.is_empty() {
                        let start = span_start.unwrap_or(idx);
                        tokens.push(Token {
                            text: std::mem::take(&mut current),
                            span: start..span_end,
                        });
                    }
                    span_start = None;
                }
            }
            _ => {
                current.push(ch);
                span_start.get_or_insert(idx);
                span_end = ch_end;
            }
        }
    }

    if !current.is_empty() {
        let start = span_start.unwrap_or(input.len());
        tokens.push(Token {
            text: current,
            span: start..span_end,
        });
    }

    tokens
}
