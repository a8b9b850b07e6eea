//! Template sources
//!
//! A [`SourceProvider`] maps template keys to text. Keys are `/`-separated
//! paths relative to the provider root (`Views/Home/Index`); a leading `/`
//! or `~/` is ignored.

mod fs;
mod memory;

pub use fs::FileSystemSource;
pub use memory::InMemorySource;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("TEMPLATE_NOT_FOUND: template '{key}' does not exist")]
    NotFound { key: String },

    #[error("TEMPLATE_KEY_INVALID: '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("TEMPLATE_READ_ERROR: failed to read '{}': {source}", path.display())]
    Io {
        key: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Template text with its identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSource {
    pub key: String,
    pub content: String,
    pub file_path: Option<PathBuf>,
}

impl TemplateSource {
    pub fn new(key: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            content: content.into(),
            file_path: None,
        }
    }

    pub fn with_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }
}

#[derive(Debug, Clone)]
enum Origin {
    Memory(Option<Arc<str>>),
    File(PathBuf),
}

/// A looked-up template that may or may not exist
#[derive(Debug, Clone)]
pub struct SourceItem {
    key: String,
    exists: bool,
    origin: Origin,
}

impl SourceItem {
    pub(crate) fn in_memory(key: String, content: Option<Arc<str>>) -> Self {
        Self {
            key,
            exists: content.is_some(),
            origin: Origin::Memory(content),
        }
    }

    pub(crate) fn on_disk(key: String, path: PathBuf) -> Self {
        Self {
            key,
            exists: path.is_file(),
            origin: Origin::File(path),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn physical_path(&self) -> Option<&Path> {
        match &self.origin {
            Origin::File(path) => Some(path),
            Origin::Memory(_) => None,
        }
    }

    /// Reads the template text
    pub fn read(&self) -> Result<TemplateSource, SourceError> {
        if !self.exists {
            return Err(SourceError::NotFound {
                key: self.key.clone(),
            });
        }
        match &self.origin {
            Origin::Memory(Some(content)) => Ok(TemplateSource::new(&*self.key, &**content)),
            Origin::Memory(None) => Err(SourceError::NotFound {
                key: self.key.clone(),
            }),
            Origin::File(path) => {
                let content = std::fs::read_to_string(path).map_err(|source| SourceError::Io {
                    key: self.key.clone(),
                    path: path.clone(),
                    source,
                })?;
                Ok(TemplateSource::new(&*self.key, content).with_file_path(path))
            }
        }
    }
}

pub trait SourceProvider: Send + Sync {
    fn get_item(&self, key: &str) -> Result<SourceItem, SourceError>;

    /// Import files applying to `key`, root-most first. Only existing
    /// files are returned.
    fn find_hierarchical_imports(&self, key: &str, import_file_name: &str) -> Vec<SourceItem>;
}

impl<T: SourceProvider + ?Sized> SourceProvider for Arc<T> {
    fn get_item(&self, key: &str) -> Result<SourceItem, SourceError> {
        (**self).get_item(key)
    }

    fn find_hierarchical_imports(&self, key: &str, import_file_name: &str) -> Vec<SourceItem> {
        (**self).find_hierarchical_imports(key, import_file_name)
    }
}

/// Strips `~/` and `/` prefixes and rejects keys that are empty or leave the
/// provider root.
pub(crate) fn normalize_key(key: &str) -> Result<String, SourceError> {
    let trimmed = key.trim();
    let trimmed = trimmed.strip_prefix('~').unwrap_or(trimmed);
    let trimmed = trimmed.trim_start_matches('/');

    let invalid = |reason: &str| SourceError::InvalidKey {
        key: key.to_string(),
        reason: reason.to_string(),
    };
    if trimmed.is_empty() {
        return Err(invalid("key is empty"));
    }
    if trimmed.contains('\\') {
        return Err(invalid("use '/' as the separator"));
    }
    if trimmed.split('/').any(|part| part.is_empty() || part == "." || part == "..") {
        return Err(invalid("key must be a relative path without '.' or '..' segments"));
    }
    Ok(trimmed.to_string())
}

/// Directory prefixes of `key` from the root down: `a/b/c` gives
/// `["", "a/", "a/b/"]`.
pub(crate) fn directory_prefixes(key: &str) -> Vec<String> {
    let mut prefixes = vec![String::new()];
    let mut current = String::new();
    let segments: Vec<&str> = key.split('/').collect();
    for segment in &segments[..segments.len().saturating_sub(1)] {
        current.push_str(segment);
        current.push('/');
        prefixes.push(current.clone());
    }
    prefixes
}
