//! The compiler toolchain boundary
//!
//! A [`Toolchain`] turns generated unit text into a binary plus diagnostics.
//! [`IrToolchain`] is the built-in implementation: it parses the unit,
//! resolves names against the references and emits the IR module as a
//! versioned JSON document.

mod check;
mod lexer;
mod parser;

use super::diagnostic::{codes, Diagnostic};
use super::reference::ReferenceHandle;
use crate::types::{ModelType, TemplateBaseType};

/// Kind of binary requested from the toolchain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputKind {
    #[default]
    Library,
}

#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub output: OutputKind,
    /// Namespaces imported in addition to the unit's own `using` lines
    pub usings: Vec<String>,
    /// Model type the template is compiled for
    pub model_type: ModelType,
    /// Base types a unit may inherit from
    pub base_types: Vec<TemplateBaseType>,
    /// Emit a human-readable binary
    pub debug: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            output: OutputKind::Library,
            usings: Vec::new(),
            model_type: ModelType::dynamic(),
            base_types: TemplateBaseType::builtins(),
            debug: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BuildOutput {
    /// Present only when no error diagnostic was reported
    pub binary: Option<Vec<u8>>,
    pub diagnostics: Vec<Diagnostic>,
}

impl BuildOutput {
    pub fn failed(diagnostic: Diagnostic) -> Self {
        Self {
            binary: None,
            diagnostics: vec![diagnostic],
        }
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

pub trait Toolchain: Send + Sync {
    fn build(
        &self,
        source: &str,
        options: &CompileOptions,
        references: &[ReferenceHandle],
    ) -> BuildOutput;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct IrToolchain;

impl Toolchain for IrToolchain {
    fn build(
        &self,
        source: &str,
        options: &CompileOptions,
        references: &[ReferenceHandle],
    ) -> BuildOutput {
        let unit = match lexer::tokenize(source).and_then(parser::parse) {
            Ok(unit) => unit,
            Err(diagnostic) => return BuildOutput::failed(diagnostic),
        };

        let (module, mut diagnostics) = check::lower(&unit, options, references);
        let binary = module.and_then(|module| {
            let encoded = if options.debug {
                serde_json::to_vec_pretty(&module)
            } else {
                serde_json::to_vec(&module)
            };
            match encoded {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    diagnostics.push(Diagnostic::error(
                        codes::EMIT_FAILED,
                        None,
                        format!("Failed to emit binary: {}", e),
                    ));
                    None
                }
            }
        });

        BuildOutput {
            binary,
            diagnostics,
        }
    }
}
