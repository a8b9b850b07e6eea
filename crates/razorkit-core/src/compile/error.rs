use super::diagnostic::{Diagnostic, Location};
use std::fmt;
use std::sync::Arc;

/// The toolchain reported at least one error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilationError {
    pub template: String,
    /// Every diagnostic of the failed build, warnings included
    pub diagnostics: Vec<Diagnostic>,
    /// Location of the first error, mapped to the template when possible
    pub first_error: Location,
    pub generated_source: Arc<str>,
}

impl CompilationError {
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }

    pub fn first(&self) -> Option<&Diagnostic> {
        self.errors().next()
    }
}

impl fmt::Display for CompilationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.errors().count();
        write!(f, "Failed to compile template '{}'", self.template)?;
        if let Some(first) = self.first() {
            write!(f, " at {}: {} {}", self.first_error, first.code, first.message)?;
        }
        if count > 1 {
            write!(f, " (and {} more errors)", count - 1)?;
        }
        Ok(())
    }
}

impl std::error::Error for CompilationError {}
