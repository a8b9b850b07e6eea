//! Artifact lock failures

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("timed out waiting for lock on artifact {} ({description})", path.display())]
    Timeout { path: PathBuf, description: String },

    #[error("I/O error during {operation} on artifact {}: {source}", path.display())]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
        operation: String,
    },
}

impl LockError {
    pub(crate) fn io(source: std::io::Error, path: &Path, operation: &str) -> Self {
        LockError::Io {
            source,
            path: path.to_path_buf(),
            operation: operation.to_string(),
        }
    }
}
