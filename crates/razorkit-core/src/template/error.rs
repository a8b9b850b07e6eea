//! Template parse errors

use crate::types::SourcePos;
use std::fmt;

/// Malformed template markup, reported against the original template text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// Key of the template (or import file) containing the error
    pub template: String,
    /// Position in that template's text
    pub position: SourcePos,
    /// Error message
    pub message: String,
}

impl ParseError {
    pub(crate) fn new(template: &str, position: SourcePos, message: impl Into<String>) -> Self {
        Self {
            template: template.to_string(),
            position,
            message: message.into(),
        }
    }

    pub fn line(&self) -> usize {
        self.position.line
    }

    pub fn column(&self) -> usize {
        self.position.column
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Malformed template '{}' at line {}, column {}: {}",
            self.template, self.position.line, self.position.column, self.message
        )
    }
}

impl std::error::Error for ParseError {}
