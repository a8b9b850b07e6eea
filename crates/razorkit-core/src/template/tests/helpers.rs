//! Shared helpers for code generator tests

use crate::source::TemplateSource;
use crate::template::{CodeGenerator, GeneratedUnit, ParseError};
use crate::types::{ClassName, ModelType, TemplateBaseType, TypeContext};

pub(super) fn context(key: &str) -> TypeContext {
    let model_type = ModelType::dynamic();
    TypeContext::new(
        ClassName::for_template(key, &model_type),
        TemplateBaseType::html(),
        model_type,
    )
}

/// Generates `content` as template `index` with default settings
pub(super) fn generate(content: &str) -> GeneratedUnit {
    generate_with(&CodeGenerator::new(), content, &[]).unwrap()
}

pub(super) fn generate_with(
    generator: &CodeGenerator,
    content: &str,
    imports: &[TemplateSource],
) -> Result<GeneratedUnit, ParseError> {
    generator.generate(&TemplateSource::new("index", content), imports, &context("index"))
}

pub(super) fn parse_error(content: &str) -> ParseError {
    match generate_with(&CodeGenerator::new(), content, &[]) {
        Ok(unit) => panic!("expected a parse error, got:\n{}", unit.source_text),
        Err(err) => err,
    }
}
