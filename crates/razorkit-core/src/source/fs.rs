use super::{directory_prefixes, normalize_key, SourceError, SourceItem, SourceProvider};
use std::path::{Path, PathBuf};

/// Templates stored under a root directory.
///
/// Keys map to `<root>/<key>.<extension>`; a key that already has an
/// extension is used as is.
#[derive(Debug, Clone)]
pub struct FileSystemSource {
    root: PathBuf,
    extension: String,
}

impl FileSystemSource {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into().trim_start_matches('.').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let relative = Path::new(key);
        let mut path = self.root.join(relative);
        if relative.extension().is_none() && !self.extension.is_empty() {
            path.set_extension(&self.extension);
        }
        path
    }
}

impl SourceProvider for FileSystemSource {
    fn get_item(&self, key: &str) -> Result<SourceItem, SourceError> {
        let key = normalize_key(key)?;
        let path = self.path_for(&key);
        Ok(SourceItem::on_disk(key, path))
    }

    fn find_hierarchical_imports(&self, key: &str, import_file_name: &str) -> Vec<SourceItem> {
        let Ok(key) = normalize_key(key) else {
            return Vec::new();
        };
        directory_prefixes(&key)
            .into_iter()
            .map(|prefix| format!("{}{}", prefix, import_file_name))
            .filter(|candidate| *candidate != key)
            .map(|candidate| {
                let path = self.path_for(&candidate);
                SourceItem::on_disk(candidate, path)
            })
            .filter(SourceItem::exists)
            .collect()
    }
}
