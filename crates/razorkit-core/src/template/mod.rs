//! Code generator: template markup to a generated unit
//!
//! A template is text with embedded `@` constructs (Razor subset):
//!
//! - `@Model.Name`, `@Fn(args)`, `@( expr )`: expressions written to output
//! - `@{ var x = expr; Layout = "key"; }`: code blocks
//! - `@if (..) { } else { }`, `@foreach (var x in ..) { }`: control flow
//! - `@section Name { }`: section definitions consumed by layouts
//! - `@model`, `@inherits`, `@using`, `@layout`, `@functions { }`: directives
//! - `@@` for a literal `@`, `@* ... *@` for comments
//!
//! The generated unit is plain text in the toolchain's input language. When
//! line pragmas are on, every statement that carries template code is
//! preceded by `#line <line>:<column> @<generated column>`, which lets the
//! compiler map diagnostics back to the template.

mod blocks;
mod emit;
pub mod error;
mod parse;
pub(crate) mod scan;

#[cfg(test)]
mod tests;

pub use error::ParseError;

use crate::config::consts::GENERATED_NAMESPACE;
use crate::source::TemplateSource;
use crate::types::{ClassName, SourcePos, TemplateBaseType, TypeContext};
use emit::{quote, Emitter};
use parse::{Directive, FunctionDecl, Node};
use std::collections::BTreeSet;

/// Output of the code generator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedUnit {
    /// Key of the template the unit was generated from
    pub template: String,
    pub class_name: ClassName,
    pub source_text: String,
    /// Display path of the template file, when it came from disk
    pub source_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CodeGenerator {
    emit_line_pragmas: bool,
    base_types: Vec<TemplateBaseType>,
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// A directive value after merging imports; imported values carry no
/// template position.
struct Merged {
    value: String,
    at: Option<SourcePos>,
}

impl From<Directive> for Merged {
    fn from(directive: Directive) -> Self {
        Self {
            value: directive.value,
            at: Some(directive.at),
        }
    }
}

impl CodeGenerator {
    pub fn new() -> Self {
        Self {
            emit_line_pragmas: true,
            base_types: TemplateBaseType::builtins(),
        }
    }

    pub fn with_line_pragmas(mut self, enabled: bool) -> Self {
        self.emit_line_pragmas = enabled;
        self
    }

    /// Base types whose required namespaces are added on `@inherits`
    pub fn with_base_types(mut self, base_types: Vec<TemplateBaseType>) -> Self {
        self.base_types = base_types;
        self
    }

    /// Generates the unit for `source`.
    ///
    /// `imports` are hierarchical import files, root-most first. They
    /// contribute directives only; their markup is ignored.
    pub fn generate(
        &self,
        source: &TemplateSource,
        imports: &[TemplateSource],
        context: &TypeContext,
    ) -> Result<GeneratedUnit, ParseError> {
        let mut usings = Vec::new();
        let mut model: Option<Merged> = None;
        let mut inherits: Option<Merged> = None;
        let mut layout: Option<Merged> = None;
        let mut imported_functions: Vec<FunctionDecl> = Vec::new();

        for import in imports {
            let directives = parse::parse(&import.key, &import.content)?.directives;
            usings.extend(directives.usings.into_iter().map(|d| d.value));
            let imported = |d: Directive| Merged {
                value: d.value,
                at: None,
            };
            model = directives.model.map(imported).or(model);
            inherits = directives.inherits.map(imported).or(inherits);
            layout = directives.layout.map(imported).or(layout);
            for function in directives.functions {
                imported_functions.retain(|f| f.name != function.name);
                imported_functions.push(function);
            }
        }

        let document = parse::parse(&source.key, &source.content)?;
        let directives = document.directives;
        usings.extend(directives.usings.into_iter().map(|d| d.value));
        let model = directives.model.map(Merged::from).or(model);
        let inherits = directives.inherits.map(Merged::from).or(inherits);
        let layout_inherited = directives.layout.is_none() && layout.is_some();
        let layout = directives.layout.map(Merged::from).or(layout);

        let base_type = match &inherits {
            Some(name) => self
                .base_types
                .iter()
                .find(|base| base.name == name.value)
                .cloned(),
            None => Some(context.template_base_type.clone()),
        };

        let namespaces: BTreeSet<String> = base_type
            .iter()
            .flat_map(|base| base.required_namespaces.iter().cloned())
            .chain(context.namespaces.iter().cloned())
            .chain(usings)
            .collect();

        let mut out = Emitter::new(self.emit_line_pragmas);
        out.line(0, "// <auto-generated />");
        out.line(0, &format!("// template: {}", source.key.replace(['\r', '\n'], " ")));
        out.line(0, &format!("namespace {};", GENERATED_NAMESPACE));
        out.blank();
        for namespace in &namespaces {
            out.line(0, &format!("using {};", namespace));
        }
        out.blank();

        let base_name = inherits
            .as_ref()
            .map(|d| d.value.as_str())
            .unwrap_or(&context.template_base_type.name);
        let model_name = model
            .as_ref()
            .map(|d| d.value.as_str())
            .unwrap_or_else(|| context.model_type.name());
        let header = format!("internal class {} : ", context.class_name);
        match (&inherits, &model) {
            (Some(Merged { at: Some(at), .. }), _) => out.mapped(
                0,
                Some(*at),
                &header,
                base_name,
                &format!("<{}>", model_name),
            ),
            (_, Some(Merged { at: Some(at), .. })) => out.mapped(
                0,
                Some(*at),
                &format!("{}{}<", header, base_name),
                model_name,
                ">",
            ),
            _ => out.line(0, &format!("{}{}<{}>", header, base_name, model_name)),
        }
        out.line(0, "{");

        if let Some(layout) = &layout {
            // Inherited layouts only apply when the template renders as a page
            let prefix = if layout_inherited {
                "default layout "
            } else {
                "layout "
            };
            out.mapped(1, layout.at, prefix, &quote(&layout.value), ";");
        }

        let own_names: BTreeSet<&str> = directives
            .functions
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        for (function, mapped) in imported_functions
            .iter()
            .filter(|f| !own_names.contains(f.name.as_str()))
            .map(|f| (f, false))
            .chain(directives.functions.iter().map(|f| (f, true)))
        {
            out.mapped(
                1,
                mapped.then_some(function.at),
                &format!("function {}({}) => ", function.name, function.params.join(", ")),
                &function.code,
                ";",
            );
        }

        for node in &document.nodes {
            if let Node::Section { name, body, .. } = node {
                out.blank();
                out.line(1, &format!("section {}", quote(name)));
                out.line(1, "{");
                out.nodes(2, body);
                out.line(1, "}");
            }
        }

        out.blank();
        out.line(1, "execute");
        out.line(1, "{");
        out.nodes(2, &document.nodes);
        out.line(1, "}");
        out.line(0, "}");

        Ok(GeneratedUnit {
            template: source.key.clone(),
            class_name: context.class_name.clone(),
            source_text: out.finish(),
            source_path: source
                .file_path
                .as_ref()
                .map(|path| path.display().to_string()),
        })
    }
}
