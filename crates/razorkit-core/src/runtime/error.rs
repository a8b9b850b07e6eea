//! Render-time failures

use crate::types::SourcePos;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// What went wrong while loading or executing a compiled template
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionCause {
    #[error("template '{key}' was not found")]
    TemplateNotFound { key: String },

    #[error("template '{key}' could not be read: {message}")]
    SourceUnreadable { key: String, message: String },

    #[error("'{target}' has no member '{member}'")]
    MemberNotFound { target: String, member: String },

    #[error("the name '{name}' is not defined")]
    UndefinedName { name: String },

    #[error("helper '{helper}' failed: {message}")]
    HelperFailed { helper: String, message: String },

    #[error("a value of kind {kind} cannot be iterated")]
    NotIterable { kind: String },

    #[error("a value of kind {kind} cannot be written to the output")]
    NotPrintable { kind: String },

    #[error("required section '{name}' is not defined")]
    RequiredSectionMissing { name: String },

    #[error("RenderBody can only be called from a layout")]
    BodyUnavailable,

    #[error("section '{name}' is already defined")]
    DuplicateSection { name: String },

    #[error("section names must not be empty")]
    InvalidSectionName,

    #[error("function calls nested deeper than {depth}")]
    RecursionLimit { depth: usize },

    #[error("artifact '{}' could not be used: {message}", path.display())]
    ArtifactIo { path: PathBuf, message: String },

    #[error("compiled binary is invalid: {message}")]
    InvalidBinary { message: String },

    #[error("compilation was aborted before it produced a result")]
    CompilationAborted,
}

/// An [`ExecutionCause`] attributed to a template and, when known, a
/// template position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionError {
    pub template: String,
    pub location: Option<SourcePos>,
    pub cause: ExecutionCause,
}

impl ExecutionError {
    pub fn new(template: &str, location: Option<SourcePos>, cause: ExecutionCause) -> Self {
        Self {
            template: template.to_string(),
            location,
            cause,
        }
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Failed to render '{}'", self.template)?;
        if let Some(location) = self.location {
            write!(f, " at {}", location)?;
        }
        write!(f, ": {}", self.cause)
    }
}

impl std::error::Error for ExecutionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}
