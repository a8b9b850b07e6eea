//! References: helper libraries generated code may call into
//!
//! A [`Reference`] is a named namespace of helper functions. Generated code
//! calls them qualified (`Text.Upper(x)`) or unqualified after a `using`
//! directive. Which references a compilation may see is decided by a
//! [`ReferenceResolver`].

use crate::types::TypeContext;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Signature of a helper function
pub type HelperFn = dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync;

/// Number of arguments a callable accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    Between(usize, usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(&self, count: usize) -> bool {
        match *self {
            Arity::Exact(n) => count == n,
            Arity::Between(min, max) => (min..=max).contains(&count),
            Arity::AtLeast(min) => count >= min,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{}", n),
            Arity::Between(min, max) => write!(f, "{} to {}", min, max),
            Arity::AtLeast(min) => write!(f, "at least {}", min),
        }
    }
}

/// One callable exported by a reference
#[derive(Clone)]
pub struct Helper {
    arity: Arity,
    markup: bool,
    func: Arc<HelperFn>,
}

impl Helper {
    pub fn arity(&self) -> Arity {
        self.arity
    }

    /// Markup helpers produce output that is written without encoding
    pub fn returns_markup(&self) -> bool {
        self.markup
    }

    pub fn call(&self, args: &[Value]) -> Result<Value, String> {
        (self.func)(args)
    }
}

impl fmt::Debug for Helper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Helper")
            .field("arity", &self.arity)
            .field("markup", &self.markup)
            .finish_non_exhaustive()
    }
}

/// A namespace of helpers
#[derive(Clone)]
pub struct Reference {
    namespace: String,
    helpers: BTreeMap<String, Helper>,
}

pub type ReferenceHandle = Arc<Reference>;

impl Reference {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            helpers: BTreeMap::new(),
        }
    }

    pub fn with_helper<F>(self, name: impl Into<String>, arity: Arity, func: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.insert(name.into(), arity, false, Arc::new(func))
    }

    pub fn with_markup_helper<F>(self, name: impl Into<String>, arity: Arity, func: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.insert(name.into(), arity, true, Arc::new(func))
    }

    fn insert(mut self, name: String, arity: Arity, markup: bool, func: Arc<HelperFn>) -> Self {
        self.helpers.insert(name, Helper { arity, markup, func });
        self
    }

    pub fn into_handle(self) -> ReferenceHandle {
        Arc::new(self)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn helper(&self, name: &str) -> Option<&Helper> {
        self.helpers.get(name)
    }

    pub fn helper_names(&self) -> impl Iterator<Item = &str> {
        self.helpers.keys().map(String::as_str)
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reference")
            .field("namespace", &self.namespace)
            .field("helpers", &self.helpers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Decides which references a compilation may use
pub trait ReferenceResolver: Send + Sync {
    fn resolve(&self, context: &TypeContext, defaults: &[ReferenceHandle]) -> Vec<ReferenceHandle>;
}

/// Defaults first, then the references requested by the type context
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultReferenceResolver;

impl ReferenceResolver for DefaultReferenceResolver {
    fn resolve(&self, context: &TypeContext, defaults: &[ReferenceHandle]) -> Vec<ReferenceHandle> {
        dedup_by_namespace(defaults.iter().chain(context.references.iter()).cloned())
    }
}

/// Keeps the first reference for each namespace, preserving order
pub fn dedup_by_namespace<I>(references: I) -> Vec<ReferenceHandle>
where
    I: IntoIterator<Item = ReferenceHandle>,
{
    let mut seen = HashSet::new();
    references
        .into_iter()
        .filter(|reference| seen.insert(reference.namespace().to_string()))
        .collect()
}

/// References every compilation receives unless a resolver drops them
pub fn default_references() -> Vec<ReferenceHandle> {
    vec![text_reference(), html_reference()]
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn expect_str<'a>(args: &'a [Value], index: usize, function: &str) -> Result<&'a str, String> {
    args.get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("{}: argument {} must be a string", function, index + 1))
}

/// `Text`: string helpers
pub fn text_reference() -> ReferenceHandle {
    Reference::new("Text")
        .with_helper("Upper", Arity::Exact(1), |args| {
            Ok(Value::String(as_text(&args[0]).to_uppercase()))
        })
        .with_helper("Lower", Arity::Exact(1), |args| {
            Ok(Value::String(as_text(&args[0]).to_lowercase()))
        })
        .with_helper("Trim", Arity::Exact(1), |args| {
            Ok(Value::String(as_text(&args[0]).trim().to_string()))
        })
        .with_helper("Length", Arity::Exact(1), |args| match &args[0] {
            Value::String(s) => Ok(Value::from(s.chars().count())),
            Value::Array(items) => Ok(Value::from(items.len())),
            Value::Object(map) => Ok(Value::from(map.len())),
            Value::Null => Ok(Value::from(0)),
            other => Err(format!("Length: unsupported value {}", other)),
        })
        .with_helper("Concat", Arity::AtLeast(0), |args| {
            Ok(Value::String(args.iter().map(as_text).collect()))
        })
        .with_helper("Join", Arity::Exact(2), |args| {
            let separator = expect_str(args, 1, "Join")?;
            let items = args[0]
                .as_array()
                .ok_or_else(|| "Join: argument 1 must be an array".to_string())?;
            Ok(Value::String(
                items.iter().map(as_text).collect::<Vec<_>>().join(separator),
            ))
        })
        .with_helper("Default", Arity::Exact(2), |args| match &args[0] {
            Value::Null => Ok(args[1].clone()),
            Value::String(s) if s.is_empty() => Ok(args[1].clone()),
            other => Ok(other.clone()),
        })
        .into_handle()
}

/// `Html`: encoding helpers
pub fn html_reference() -> ReferenceHandle {
    Reference::new("Html")
        .with_helper("Encode", Arity::Exact(1), |args| {
            Ok(Value::String(crate::runtime::value::html_encode(&as_text(
                &args[0],
            ))))
        })
        .with_markup_helper("Attribute", Arity::Exact(2), |args| {
            let name = expect_str(args, 0, "Attribute")?;
            match &args[1] {
                Value::Null | Value::Bool(false) => Ok(Value::String(String::new())),
                Value::Bool(true) => Ok(Value::String(format!(" {}", name))),
                value => Ok(Value::String(format!(
                    " {}=\"{}\"",
                    name,
                    crate::runtime::value::html_encode(&as_text(value))
                ))),
            }
        })
        .into_handle()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClassName, ModelType, TemplateBaseType};
    use serde_json::json;

    fn context_with(references: Vec<ReferenceHandle>) -> TypeContext {
        TypeContext::new(
            ClassName::for_template("t", &ModelType::dynamic()),
            TemplateBaseType::html(),
            ModelType::dynamic(),
        )
        .with_references(references)
    }

    #[test]
    fn test_arity_accepts() {
        assert!(Arity::Exact(1).accepts(1));
        assert!(!Arity::Exact(1).accepts(2));
        assert!(Arity::Between(1, 2).accepts(2));
        assert!(!Arity::Between(1, 2).accepts(0));
        assert!(Arity::AtLeast(0).accepts(5));
    }

    #[test]
    fn test_default_resolver_keeps_first_namespace() {
        let custom_text = Reference::new("Text").into_handle();
        let extra = Reference::new("Dates").into_handle();
        let context = context_with(vec![custom_text, extra]);

        let resolved = DefaultReferenceResolver.resolve(&context, &default_references());
        let namespaces: Vec<_> = resolved.iter().map(|r| r.namespace()).collect();
        assert_eq!(namespaces, vec!["Text", "Html", "Dates"]);
        // The default Text library wins over the later duplicate
        assert!(resolved[0].helper("Upper").is_some());
    }

    #[test]
    fn test_text_helpers() {
        let text = text_reference();
        let upper = text.helper("Upper").unwrap();
        assert_eq!(upper.call(&[json!("abc")]).unwrap(), json!("ABC"));

        let join = text.helper("Join").unwrap();
        assert_eq!(
            join.call(&[json!(["a", "b"]), json!(", ")]).unwrap(),
            json!("a, b")
        );
        assert!(join.call(&[json!("a"), json!(",")]).is_err());

        let fallback = text.helper("Default").unwrap();
        assert_eq!(fallback.call(&[json!(null), json!("n/a")]).unwrap(), json!("n/a"));
    }

    #[test]
    fn test_html_attribute_is_markup() {
        let html = html_reference();
        let attribute = html.helper("Attribute").unwrap();
        assert!(attribute.returns_markup());
        assert_eq!(
            attribute.call(&[json!("title"), json!("a<b")]).unwrap(),
            json!(" title=\"a&lt;b\"")
        );
        assert_eq!(attribute.call(&[json!("hidden"), json!(false)]).unwrap(), json!(""));
    }
}
