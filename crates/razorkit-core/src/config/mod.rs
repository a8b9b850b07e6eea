//! Engine configuration (`razorkit.toml` style)

pub mod consts;
mod model;

pub use model::{
    ArtifactMode, ArtifactsConfig, CompilerConfig, EngineConfig, RuntimeConfig, SourceConfig,
};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("CONFIG_READ_ERROR: failed to read '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CONFIG_PARSE_ERROR: {0}")]
    Parse(String),

    #[error("CONFIG_INVALID_VALUE: {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("CONFIG_ARTIFACT_DIR: failed to prepare artifact directory: {0}")]
    ArtifactDir(#[source] std::io::Error),
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}
