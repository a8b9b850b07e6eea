use crate::compile::CompilationError;
use crate::runtime::ExecutionError;
use crate::template::ParseError;
use thiserror::Error;

/// Every failure the engine reports to callers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("PARSE_ERROR: {0}")]
    Parse(#[from] ParseError),

    #[error("COMPILATION_ERROR: {0}")]
    Compilation(#[from] CompilationError),

    #[error("LAYOUT_CYCLE: layout chain {} returns to an earlier template", chain.join(" -> "))]
    LayoutCycle { chain: Vec<String> },

    #[error(
        "LAYOUT_DEPTH_EXCEEDED: layout chain {} is longer than {max_depth}",
        chain.join(" -> ")
    )]
    LayoutDepthExceeded { chain: Vec<String>, max_depth: usize },

    #[error("EXECUTION_ERROR: {0}")]
    Execution(#[from] ExecutionError),
}

impl TemplateError {
    /// The execution cause, for execution failures
    pub fn execution_cause(&self) -> Option<&crate::runtime::ExecutionCause> {
        match self {
            TemplateError::Execution(error) => Some(&error.cause),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, TemplateError>;
