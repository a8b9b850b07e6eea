//! Loading compiled binaries
//!
//! A binary is a serialized [`Module`]. Loading checks the format version,
//! binds every import slot to a helper from the reference set and resolves
//! the base type's output encoding.

use super::ir::Module;
use super::reference::{Helper, ReferenceHandle};
use crate::config::consts::BINARY_FORMAT_VERSION;
use crate::runtime::ExecutionCause;
use crate::types::{Encoding, TemplateBaseType};

/// A loaded and linked module
#[derive(Debug)]
pub struct Program {
    module: Module,
    helpers: Vec<Helper>,
    encoding: Encoding,
}

impl Program {
    pub fn module(&self) -> &Module {
        &self.module
    }

    /// The helper bound to an import slot
    pub fn helper(&self, slot: usize) -> Option<&Helper> {
        self.helpers.get(slot)
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }
}

fn invalid(message: impl Into<String>) -> ExecutionCause {
    ExecutionCause::InvalidBinary {
        message: message.into(),
    }
}

pub(crate) fn load(
    bytes: &[u8],
    references: &[ReferenceHandle],
    base_types: &[TemplateBaseType],
) -> Result<Program, ExecutionCause> {
    let module: Module = serde_json::from_slice(bytes).map_err(|e| invalid(e.to_string()))?;
    if module.format != BINARY_FORMAT_VERSION {
        return Err(invalid(format!(
            "format version {} is not supported (expected {})",
            module.format, BINARY_FORMAT_VERSION
        )));
    }

    let helpers = module
        .imports
        .iter()
        .map(|import| {
            references
                .iter()
                .find(|r| r.namespace() == import.namespace)
                .and_then(|r| r.helper(&import.name))
                .cloned()
                .ok_or_else(|| {
                    invalid(format!(
                        "unresolved import '{}.{}'",
                        import.namespace, import.name
                    ))
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let encoding = base_types
        .iter()
        .find(|base| base.name == module.base_type)
        .map(|base| base.encoding)
        .ok_or_else(|| invalid(format!("unknown base type '{}'", module.base_type)))?;

    Ok(Program {
        module,
        helpers,
        encoding,
    })
}
