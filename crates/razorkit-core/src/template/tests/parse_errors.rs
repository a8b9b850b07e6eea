//! Malformed markup

use super::helpers::{generate_with, parse_error};
use super::*;

fn assert_error_at(content: &str, line: usize, column: usize, fragment: &str) {
    let err = parse_error(content);
    assert_eq!(
        (err.line(), err.column()),
        (line, column),
        "wrong position for {:?}: {}",
        content,
        err
    );
    assert!(
        err.message.contains(fragment),
        "message {:?} does not contain {:?}",
        err.message,
        fragment
    );
}

#[test]
fn test_unclosed_if_block() {
    assert_error_at(
        "@if (Model.A) {\nabc",
        1,
        15,
        "'if' block is missing a closing '}'",
    );
}

#[test]
fn test_unclosed_section_reports_its_line() {
    assert_error_at(
        "<p>\n@section Foot {\nbye",
        2,
        1,
        "section 'Foot' block is missing a closing '}'",
    );
}

#[test]
fn test_nested_sections() {
    assert_error_at("@section A {@section B {x}}", 1, 13, "cannot be nested");
}

#[test]
fn test_duplicate_section() {
    assert_error_at(
        "@section A {x}\n@section A {y}",
        2,
        1,
        "Section 'A' is already defined at line 1",
    );
}

#[test]
fn test_section_inside_block() {
    assert_error_at("@if (Model.A) {@section S {x}}", 1, 16, "only allowed at the top level");
}

#[test]
fn test_unterminated_comment() {
    assert_error_at("a @* b", 1, 3, "comment block is not terminated");
}

#[test]
fn test_empty_explicit_expression() {
    assert_error_at("x @( )", 1, 3, "'@()' is empty");
}

#[test]
fn test_unbalanced_explicit_expression() {
    assert_error_at("@(Model.A]", 1, 10, "Unexpected ']'");
    assert_error_at("@(\"open)", 1, 3, "Unterminated string literal");
}

#[test]
fn test_unsupported_keywords() {
    assert_error_at("@while (x) {}", 1, 1, "'@while' is not supported");
    assert_error_at("@else {}", 1, 1, "without a preceding '@if'");
}

#[test]
fn test_invalid_transition() {
    assert_error_at("@!", 1, 1, "'!' is not valid at the start of a code block");
    assert_error_at("abc @", 1, 5, "Unexpected end of template");
}

#[test]
fn test_malformed_foreach() {
    assert_error_at(
        "@foreach (item of Model.Items) {x}",
        1,
        11,
        "Expected 'var <name> in <expression>'",
    );
}

#[test]
fn test_line_directive_errors() {
    assert_error_at("@model A\n@model B\n", 2, 1, "may only appear once");
    assert_error_at("@model 1abc\n", 1, 8, "'1abc' is not a valid name");
    assert_error_at("@inherits\n", 1, 1, "requires a value");
}

#[test]
fn test_code_block_errors() {
    assert_error_at("@{ var x = 1 }", 1, 4, "Expected ';' after statement");
    assert_error_at("@{ x(); }", 1, 4, "Unsupported statement");
    assert_error_at("@{ Layout = Model.L; }", 1, 13, "string literal");
    assert_error_at(
        "@layout A\n@{ Layout = \"B\"; }",
        2,
        4,
        "may only be set once",
    );
}

#[test]
fn test_function_declaration_errors() {
    assert_error_at("@functions { Bad => 1; }", 1, 14, "Expected '<Name>(<parameters>)");
    assert_error_at(
        "@functions { F(x) => x; F(y) => y; }",
        1,
        25,
        "Function 'F' is already defined",
    );
}

#[test]
fn test_import_errors_name_the_import() {
    let imports = [TemplateSource::new("_imports", "@model\n")];
    let err = generate_with(&CodeGenerator::new(), "x", &imports).unwrap_err();
    assert_eq!(err.template, "_imports");
    assert_eq!(err.position, SourcePos::new(1, 1));
}

#[test]
fn test_display_includes_position() {
    let err = parse_error("@!");
    assert_eq!(
        err.to_string(),
        "Malformed template 'index' at line 1, column 1: '!' is not valid at the start of a code block"
    );
}
