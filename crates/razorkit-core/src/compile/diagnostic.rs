//! Compiler diagnostics and the generated-to-template source map

use crate::types::SourcePos;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        })
    }
}

/// Diagnostic codes reported by the built-in toolchain
pub mod codes {
    pub const SYNTAX: &str = "RK1001";
    pub const UNKNOWN_NAME: &str = "RK1002";
    pub const UNKNOWN_MEMBER: &str = "RK1003";
    pub const UNKNOWN_FUNCTION: &str = "RK1004";
    pub const ARITY: &str = "RK1005";
    pub const AMBIGUOUS: &str = "RK1006";
    pub const UNKNOWN_BASE_TYPE: &str = "RK1007";
    pub const DUPLICATE_FUNCTION: &str = "RK1008";
    pub const EMIT_FAILED: &str = "RK1009";

    pub const UNKNOWN_NAMESPACE: &str = "RK2001";
    pub const MODEL_MISMATCH: &str = "RK2002";
    pub const UNUSED_FUNCTION: &str = "RK2003";
}

/// One toolchain message; `position` is in generated-source coordinates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: String,
    pub message: String,
    pub position: Option<SourcePos>,
}

impl Diagnostic {
    pub fn new(
        severity: Severity,
        code: &str,
        position: Option<SourcePos>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            code: code.to_string(),
            message: message.into(),
            position,
        }
    }

    pub fn error(code: &str, position: Option<SourcePos>, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, code, position, message)
    }

    pub fn warning(code: &str, position: Option<SourcePos>, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, code, position, message)
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.severity, self.code)?;
        if let Some(position) = self.position {
            write!(f, " at {}", position)?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Where a compilation error is reported
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Template { template: String, position: SourcePos },
    Generated(SourcePos),
    Unknown,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Template { template, position } => {
                write!(f, "template '{}' {}", template, position)
            }
            Location::Generated(position) => write!(f, "generated source {}", position),
            Location::Unknown => f.write_str("unknown location"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Mapping {
    generated_line: usize,
    generated_column: usize,
    template: SourcePos,
}

/// Maps generated positions back to the template using `#line` pragmas
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceMap {
    entries: Vec<Mapping>,
}

impl SourceMap {
    /// Collects `#line L:C @G` pragmas. Each one describes the line that
    /// follows it.
    pub fn from_generated(text: &str) -> Self {
        let entries = text
            .lines()
            .enumerate()
            .filter_map(|(index, line)| {
                let (template, generated_column) = parse_pragma(line)?;
                Some(Mapping {
                    generated_line: index + 2,
                    generated_column,
                    template,
                })
            })
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Template position for a generated position.
    ///
    /// On a mapped line the column offset from the mapped start is carried
    /// over; otherwise the nearest preceding mapping is used.
    pub fn map(&self, generated: SourcePos) -> Option<SourcePos> {
        if let Some(entry) = self
            .entries
            .iter()
            .find(|entry| entry.generated_line == generated.line)
        {
            let offset = generated.column.saturating_sub(entry.generated_column);
            return Some(SourcePos::new(
                entry.template.line,
                entry.template.column + offset,
            ));
        }
        self.entries
            .iter()
            .rev()
            .find(|entry| entry.generated_line < generated.line)
            .map(|entry| entry.template)
    }
}

/// Parses `#line 3:7 @14` into the template position and generated column
pub(crate) fn parse_pragma(line: &str) -> Option<(SourcePos, usize)> {
    let rest = line.trim().strip_prefix("#line ")?;
    let (position, column) = rest.split_once(" @")?;
    let (line, col) = position.trim().split_once(':')?;
    Some((
        SourcePos::new(line.parse().ok()?, col.parse().ok()?),
        column.trim().parse().ok()?,
    ))
}
