//! Type descriptors shared by the generator, compiler and runtime

use crate::compile::reference::ReferenceHandle;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;

/// 1-based line/column position in a text (template or generated source)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourcePos {
    pub line: usize,
    pub column: usize,
}

impl SourcePos {
    pub const fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Identity of a model type as used in cache keys
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModelTypeId(String);

impl ModelTypeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Describes the shape of the model a template is rendered with.
///
/// A model type with `members` lets the compiler reject `Model.X` references
/// to undeclared members; `dynamic` and opaque types defer every member
/// lookup to render time. Identity (see [`ModelType::id`]) is the name only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelType {
    name: String,
    members: Option<BTreeSet<String>>,
}

impl ModelType {
    pub const DYNAMIC: &'static str = "dynamic";

    pub fn dynamic() -> Self {
        Self {
            name: Self::DYNAMIC.to_string(),
            members: None,
        }
    }

    /// A named type whose members are not checked at compile time
    pub fn opaque(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: None,
        }
    }

    /// A named type with a closed set of top-level members
    pub fn named<I, S>(name: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            members: Some(members.into_iter().map(Into::into).collect()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> ModelTypeId {
        ModelTypeId(self.name.clone())
    }

    pub fn is_dynamic(&self) -> bool {
        self.name == Self::DYNAMIC
    }

    pub fn members(&self) -> Option<&BTreeSet<String>> {
        self.members.as_ref()
    }

    /// `true` when `member` is declared, or when members are unchecked
    pub fn accepts_member(&self, member: &str) -> bool {
        self.members
            .as_ref()
            .map_or(true, |members| members.contains(member))
    }
}

impl Default for ModelType {
    fn default() -> Self {
        Self::dynamic()
    }
}

/// How emitted expression values are written to the output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    #[default]
    Html,
    Raw,
}

/// A template base type the generated class may derive from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateBaseType {
    pub name: String,
    pub encoding: Encoding,
    /// Namespaces every template deriving from this type imports
    #[serde(default)]
    pub required_namespaces: Vec<String>,
}

impl TemplateBaseType {
    pub const HTML: &'static str = "TemplateBase";
    pub const RAW: &'static str = "RawTemplateBase";

    pub fn html() -> Self {
        Self {
            name: Self::HTML.to_string(),
            encoding: Encoding::Html,
            required_namespaces: vec!["Html".to_string()],
        }
    }

    pub fn raw() -> Self {
        Self {
            name: Self::RAW.to_string(),
            encoding: Encoding::Raw,
            required_namespaces: Vec::new(),
        }
    }

    pub fn builtins() -> Vec<Self> {
        vec![Self::html(), Self::raw()]
    }
}

/// Non-empty name of a generated template class
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassName(String);

impl ClassName {
    pub const PREFIX: &'static str = "Template_";

    /// Returns `None` for names that are empty or not identifiers.
    pub fn new(name: impl Into<String>) -> Option<Self> {
        let name = name.into();
        let mut chars = name.chars();
        let valid_start = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            Some(Self(name))
        } else {
            None
        }
    }

    /// Derives a stable class name from the template key and model type
    pub fn for_template(key: &str, model_type: &ModelType) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        hasher.update([0u8]);
        hasher.update(model_type.name().as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        Self(format!("{}{}", Self::PREFIX, &digest[..16]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClassName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything the generator and compiler need to know about the type being
/// produced for one compilation request.
#[derive(Debug, Clone)]
pub struct TypeContext {
    pub class_name: ClassName,
    pub namespaces: BTreeSet<String>,
    pub template_base_type: TemplateBaseType,
    pub model_type: ModelType,
    pub references: Vec<ReferenceHandle>,
}

impl TypeContext {
    pub fn new(
        class_name: ClassName,
        template_base_type: TemplateBaseType,
        model_type: ModelType,
    ) -> Self {
        Self {
            class_name,
            namespaces: BTreeSet::new(),
            template_base_type,
            model_type,
            references: Vec::new(),
        }
    }

    pub fn with_namespaces<I, S>(mut self, namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.namespaces
            .extend(namespaces.into_iter().map(Into::into));
        self
    }

    pub fn with_references(mut self, references: Vec<ReferenceHandle>) -> Self {
        self.references = references;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_name_is_stable_and_prefixed() {
        let model = ModelType::opaque("Person");
        let a = ClassName::for_template("views/index", &model);
        let b = ClassName::for_template("views/index", &model);
        assert_eq!(a, b);
        assert!(a.as_str().starts_with("Template_"));
        assert_eq!(a.as_str().len(), "Template_".len() + 16);
    }

    #[test]
    fn test_class_name_depends_on_model_type() {
        let a = ClassName::for_template("index", &ModelType::dynamic());
        let b = ClassName::for_template("index", &ModelType::opaque("Person"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_class_name_rejects_empty_and_non_identifiers() {
        assert!(ClassName::new("").is_none());
        assert!(ClassName::new("1abc").is_none());
        assert!(ClassName::new("a-b").is_none());
        assert!(ClassName::new("_Page1").is_some());
    }

    #[test]
    fn test_model_type_members() {
        let typed = ModelType::named("Person", ["Name", "Age"]);
        assert!(typed.accepts_member("Name"));
        assert!(!typed.accepts_member("Email"));
        assert!(ModelType::dynamic().accepts_member("Anything"));
        assert!(ModelType::dynamic().is_dynamic());
        assert_eq!(typed.id().as_str(), "Person");
    }
}
