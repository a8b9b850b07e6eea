use super::{directory_prefixes, normalize_key, SourceError, SourceItem, SourceProvider};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// Templates held in memory, keyed by normalized path
#[derive(Debug, Default)]
pub struct InMemorySource {
    templates: RwLock<BTreeMap<String, Arc<str>>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`InMemorySource::insert`]
    pub fn with(self, key: &str, content: &str) -> Result<Self, SourceError> {
        self.insert(key, content)?;
        Ok(self)
    }

    /// Adds or replaces a template. Replacing does not touch compiled
    /// entries; invalidate the engine cache for that key.
    pub fn insert(&self, key: &str, content: &str) -> Result<(), SourceError> {
        let key = normalize_key(key)?;
        let mut templates = self
            .templates
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        templates.insert(key, Arc::from(content));
        Ok(())
    }

    pub fn remove(&self, key: &str) -> bool {
        let Ok(key) = normalize_key(key) else {
            return false;
        };
        self.templates
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&key)
            .is_some()
    }

    fn lookup(&self, key: &str) -> Option<Arc<str>> {
        self.templates
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }
}

impl SourceProvider for InMemorySource {
    fn get_item(&self, key: &str) -> Result<SourceItem, SourceError> {
        let key = normalize_key(key)?;
        let content = self.lookup(&key);
        Ok(SourceItem::in_memory(key, content))
    }

    fn find_hierarchical_imports(&self, key: &str, import_file_name: &str) -> Vec<SourceItem> {
        let Ok(key) = normalize_key(key) else {
            return Vec::new();
        };
        directory_prefixes(&key)
            .into_iter()
            .map(|prefix| format!("{}{}", prefix, import_file_name))
            .filter(|candidate| *candidate != key)
            .filter_map(|candidate| {
                let content = self.lookup(&candidate)?;
                Some(SourceItem::in_memory(candidate, Some(content)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_item_reads_content() {
        let source = InMemorySource::new().with("Views/Index", "Hello").unwrap();
        let item = source.get_item("/Views/Index").unwrap();
        assert!(item.exists());
        assert_eq!(item.key(), "Views/Index");
        assert_eq!(item.read().unwrap().content, "Hello");
        assert!(item.physical_path().is_none());
    }

    #[test]
    fn test_missing_item_does_not_exist() {
        let source = InMemorySource::new();
        let item = source.get_item("Nope").unwrap();
        assert!(!item.exists());
    }

    #[test]
    fn test_hierarchical_imports_root_first() {
        let source = InMemorySource::new()
            .with("_imports", "@using Root")
            .unwrap()
            .with("Views/_imports", "@using Views")
            .unwrap()
            .with("Views/Home/Index", "x")
            .unwrap();

        let imports = source.find_hierarchical_imports("Views/Home/Index", "_imports");
        let keys: Vec<_> = imports.iter().map(SourceItem::key).collect();
        assert_eq!(keys, vec!["_imports", "Views/_imports"]);
    }

    #[test]
    fn test_import_file_does_not_import_itself() {
        let source = InMemorySource::new().with("_imports", "@using A").unwrap();
        assert!(source.find_hierarchical_imports("_imports", "_imports").is_empty());
    }

    #[test]
    fn test_insert_replaces_and_remove() {
        let source = InMemorySource::new().with("a", "1").unwrap();
        source.insert("a", "2").unwrap();
        assert_eq!(source.get_item("a").unwrap().read().unwrap().content, "2");
        assert!(source.remove("a"));
        assert!(!source.get_item("a").unwrap().exists());
    }
}
