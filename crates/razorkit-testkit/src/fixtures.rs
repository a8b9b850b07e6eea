//! Template trees on disk
//!
//! [`TemplateTree`] lays out `.cshtml` files under a scratch directory so
//! tests can exercise [`FileSystemSource`] and hierarchical imports.

use razorkit_core::source::FileSystemSource;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Extension every fixture template is written with
pub const EXTENSION: &str = "cshtml";

/// A directory of templates, removed on drop
pub struct TemplateTree {
    dir: TempDir,
}

impl TemplateTree {
    /// An empty tree under the workspace `.tmp/`
    pub fn new() -> Self {
        Self {
            dir: crate::temp_dir_in_workspace(),
        }
    }

    /// Adds `<key>.cshtml` with `content`, creating parent directories
    pub fn with(self, key: &str, content: &str) -> Self {
        self.write(key, content);
        self
    }

    /// Writes or overwrites `<key>.cshtml`
    pub fn write(&self, key: &str, content: &str) -> PathBuf {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .unwrap_or_else(|e| panic!("Failed to create {}: {}", parent.display(), e));
        }
        std::fs::write(&path, content)
            .unwrap_or_else(|e| panic!("Failed to write {}: {}", path.display(), e));
        path
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root().join(format!("{}.{}", key, EXTENSION))
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// A source provider reading this tree
    pub fn source(&self) -> FileSystemSource {
        FileSystemSource::new(self.root(), EXTENSION)
    }
}

impl Default for TemplateTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use razorkit_core::source::SourceProvider;

    #[test]
    fn test_tree_writes_nested_templates() {
        let tree = TemplateTree::new()
            .with("Views/Home/Index", "Hi")
            .with("_imports", "@using Site");

        assert!(tree.root().join("Views/Home/Index.cshtml").is_file());
        let item = tree.source().get_item("Views/Home/Index").unwrap();
        assert_eq!(item.read().unwrap().content, "Hi");
        assert_eq!(
            tree.source()
                .find_hierarchical_imports("Views/Home/Index", "_imports")
                .len(),
            1
        );
    }

    #[test]
    fn test_tree_is_removed_on_drop() {
        let tree = TemplateTree::new().with("a", "x");
        let root = tree.root().to_path_buf();
        drop(tree);
        assert!(!root.exists());
    }
}
