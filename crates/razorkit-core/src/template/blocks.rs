//! Delimiter matching for embedded code
//!
//! Code inside `@( )`, `@{ }`, directive parentheses and `@functions { }` is
//! copied verbatim into the generated unit, so the generator only needs to
//! find where it ends. Matching respects nesting of all bracket kinds and
//! skips over string literals.

use super::scan::{advance, Cursor};
use crate::types::SourcePos;

/// Scanner state while walking embedded code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScanState {
    /// Plain code
    Code,
    /// Inside `"..."`, started at the given position
    InString { start: SourcePos },
    /// After a backslash inside a string
    Escape { start: SourcePos },
}

/// A slice of template text with the position of its first character
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Span<'a> {
    pub text: &'a str,
    pub start: SourcePos,
}

impl<'a> Span<'a> {
    /// Trims surrounding whitespace while keeping `start` accurate
    pub fn trim(&self) -> Span<'a> {
        let leading = self.text.len() - self.text.trim_start().len();
        Span {
            text: self.text.trim(),
            start: advance(self.start, &self.text[..leading]),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Why a delimited region could not be matched
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Unmatched {
    /// A string literal starting at the position was never closed
    String(SourcePos),
    /// The region was never closed
    Unclosed,
    /// A closing delimiter that does not match the innermost opener
    Mismatched { found: char, at: SourcePos },
}

fn closer_for(open: char) -> Option<char> {
    match open {
        '(' => Some(')'),
        '[' => Some(']'),
        '{' => Some('}'),
        _ => None,
    }
}

/// Consumes a region starting at the opening delimiter under the cursor and
/// returns its inner text. On success the cursor sits after the closer.
pub(crate) fn balanced<'a>(cursor: &mut Cursor<'a>) -> Result<Span<'a>, Unmatched> {
    let Some(open) = cursor.peek() else {
        return Err(Unmatched::Unclosed);
    };
    let Some(close) = closer_for(open) else {
        return Err(Unmatched::Unclosed);
    };
    cursor.bump();

    let inner_start = cursor.offset();
    let inner_pos = cursor.pos();
    let mut expected = vec![close];
    let mut state = ScanState::Code;

    loop {
        let at = cursor.pos();
        let Some(c) = cursor.bump() else {
            return Err(match state {
                ScanState::Code => Unmatched::Unclosed,
                ScanState::InString { start } | ScanState::Escape { start } => {
                    Unmatched::String(start)
                }
            });
        };

        state = match state {
            ScanState::Code => match c {
                '"' => ScanState::InString { start: at },
                _ if closer_for(c).is_some() => {
                    expected.extend(closer_for(c));
                    ScanState::Code
                }
                ')' | ']' | '}' => {
                    if expected.last() != Some(&c) {
                        return Err(Unmatched::Mismatched { found: c, at });
                    }
                    expected.pop();
                    if expected.is_empty() {
                        let inner_end = cursor.offset() - c.len_utf8();
                        return Ok(Span {
                            text: cursor.slice(inner_start, inner_end),
                            start: inner_pos,
                        });
                    }
                    ScanState::Code
                }
                _ => ScanState::Code,
            },
            ScanState::InString { start } => match c {
                '\\' => ScanState::Escape { start },
                '"' => ScanState::Code,
                '\n' => return Err(Unmatched::String(start)),
                _ => ScanState::InString { start },
            },
            ScanState::Escape { start } => ScanState::InString { start },
        };
    }
}

/// Splits code at top-level `;`, ignoring separators nested in brackets or
/// strings. The final element holds any text after the last `;`.
pub(crate) fn split_statements<'a>(span: Span<'a>) -> Vec<Span<'a>> {
    let mut pieces = Vec::new();
    let mut cursor = Cursor::at(span.text, span.start);
    let mut piece_start = (0, span.start);
    let mut depth = 0usize;
    let mut state = ScanState::Code;

    loop {
        let at = cursor.pos();
        let before = cursor.offset();
        let Some(c) = cursor.bump() else { break };
        state = match state {
            ScanState::Code => match c {
                '"' => ScanState::InString { start: at },
                '(' | '[' | '{' => {
                    depth += 1;
                    ScanState::Code
                }
                ')' | ']' | '}' => {
                    depth = depth.saturating_sub(1);
                    ScanState::Code
                }
                ';' if depth == 0 => {
                    pieces.push(Span {
                        text: cursor.slice(piece_start.0, before),
                        start: piece_start.1,
                    });
                    piece_start = (cursor.offset(), cursor.pos());
                    ScanState::Code
                }
                _ => ScanState::Code,
            },
            ScanState::InString { start } => match c {
                '\\' => ScanState::Escape { start },
                '"' => ScanState::Code,
                _ => ScanState::InString { start },
            },
            ScanState::Escape { start } => ScanState::InString { start },
        };
    }

    pieces.push(Span {
        text: cursor.slice(piece_start.0, span.text.len()),
        start: piece_start.1,
    });
    pieces
}

/// Finds `needle` at top level (outside strings and brackets)
pub(crate) fn find_top_level(text: &str, needle: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (index, c) in text.char_indices() {
        if in_string {
            match (escaped, c) {
                (true, _) => escaped = false,
                (false, '\\') => escaped = true,
                (false, '"') => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            _ if depth == 0 && text[index..].starts_with(needle) => return Some(index),
            _ => {}
        }
    }
    None
}
