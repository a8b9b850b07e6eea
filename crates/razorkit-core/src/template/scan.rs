//! Character cursor with line/column tracking
//!
//! Forward-only over the template text; every consumed character updates the
//! 1-based position used in parse errors. Cursors are `Copy`, so the parser
//! can look ahead and rewind by saving one.

use crate::types::SourcePos;

#[derive(Debug, Clone, Copy)]
pub(crate) struct Cursor<'a> {
    text: &'a str,
    /// Byte offset of the next character
    offset: usize,
    line: usize,
    column: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(text: &'a str) -> Self {
        Self::at(text, SourcePos::new(1, 1))
    }

    /// Cursor over a slice whose first character sits at `start`
    pub fn at(text: &'a str, start: SourcePos) -> Self {
        Self {
            text,
            offset: 0,
            line: start.line,
            column: start.column,
        }
    }

    pub fn pos(&self) -> SourcePos {
        SourcePos::new(self.line, self.column)
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn rest(&self) -> &'a str {
        &self.text[self.offset..]
    }

    pub fn slice(&self, from: usize, to: usize) -> &'a str {
        &self.text[from..to]
    }

    pub fn is_eof(&self) -> bool {
        self.offset >= self.text.len()
    }

    pub fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    pub fn peek_second(&self) -> Option<char> {
        let mut chars = self.rest().chars();
        chars.next();
        chars.next()
    }

    pub fn starts_with(&self, pattern: &str) -> bool {
        self.rest().starts_with(pattern)
    }

    pub fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.offset += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    pub fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    pub fn eat_str(&mut self, expected: &str) -> bool {
        if self.starts_with(expected) {
            for _ in expected.chars() {
                self.bump();
            }
            true
        } else {
            false
        }
    }

    /// Skips spaces, tabs and newlines
    pub fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    /// Skips spaces and tabs on the current line
    pub fn skip_inline_whitespace(&mut self) {
        while matches!(self.peek(), Some(' ') | Some('\t')) {
            self.bump();
        }
    }

    /// Consumes the rest of the line (including `\n`) if it is blank.
    pub fn eat_blank_line_end(&mut self) -> bool {
        let mut probe = *self;
        probe.skip_inline_whitespace();
        probe.eat('\r');
        if probe.eat('\n') || probe.is_eof() {
            *self = probe;
            true
        } else {
            false
        }
    }

    /// Reads an identifier (`[A-Za-z_][A-Za-z0-9_]*`)
    pub fn identifier(&mut self) -> Option<&'a str> {
        let start = self.offset;
        if !self.peek().is_some_and(is_ident_start) {
            return None;
        }
        while self.peek().is_some_and(is_ident_char) {
            self.bump();
        }
        Some(&self.text[start..self.offset])
    }

    /// Reads up to (not including) the end of the current line
    pub fn line_rest(&mut self) -> &'a str {
        let start = self.offset;
        while self.peek().is_some_and(|c| c != '\n') {
            self.bump();
        }
        &self.text[start..self.offset]
    }
}

pub(crate) fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

pub(crate) fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

pub(crate) fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    chars.next().is_some_and(is_ident_start) && chars.all(is_ident_char)
}

/// Position reached after reading `text` starting at `start`
pub(crate) fn advance(start: SourcePos, text: &str) -> SourcePos {
    let mut cursor = Cursor::at(text, start);
    while cursor.bump().is_some() {}
    cursor.pos()
}
