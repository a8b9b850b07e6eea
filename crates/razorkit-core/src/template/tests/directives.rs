//! Directives, functions and hierarchical imports

use super::helpers::{generate, generate_with};
use super::*;

#[test]
fn test_model_directive_sets_header_type() {
    let unit = generate("@model Person\nx");
    assert!(unit.source_text.contains(": TemplateBase<"));
    assert!(unit.source_text.contains("#line 1:8 @"));
    assert!(unit.source_text.contains("TemplateBase<Person>\n"));
}

#[test]
fn test_inherits_selects_base_namespaces() {
    let unit = generate("@inherits RawTemplateBase\nx");
    assert!(unit.source_text.contains(": RawTemplateBase<dynamic>\n"));
    assert!(!unit.source_text.contains("using Html;"));
}

#[test]
fn test_using_directives_are_merged_and_sorted() {
    let unit = generate("@using Zeta\n@using Alpha;\nx");
    let text = &unit.source_text;
    assert!(text.contains("using Alpha;\nusing Html;\nusing Zeta;\n"), "{}", text);
}

#[test]
fn test_context_namespaces_are_imported() {
    let context = super::helpers::context("index").with_namespaces(["Site.Helpers"]);
    let unit = CodeGenerator::new()
        .generate(&TemplateSource::new("index", "x"), &[], &context)
        .unwrap();
    assert!(unit.source_text.contains("using Site.Helpers;\n"));
}

#[test]
fn test_layout_directive_and_assignment() {
    let unit = generate("@layout \"_Layout\"\nx");
    assert!(unit.source_text.contains("    layout \"_Layout\";\n"));

    let unit = generate("@{ Layout = \"Shared/_Main\"; }x");
    assert!(unit
        .source_text
        .contains("#line 1:13 @12\n    layout \"Shared/_Main\";\n"));
}

#[test]
fn test_functions_block() {
    let unit = generate("@functions { Twice(x) => Text.Concat(x, x); }\n@Twice(\"a\")");
    assert!(unit
        .source_text
        .contains("    function Twice(x) => Text.Concat(x, x);\n"));
    assert!(unit.source_text.contains("emit Twice(\"a\");"));
}

#[test]
fn test_imports_contribute_directives_only() {
    let imports = [TemplateSource::new(
        "_imports",
        "@using Site\n@layout _Layout\n@functions { Shout(x) => Text.Upper(x); }\nignored markup",
    )];
    let unit = generate_with(&CodeGenerator::new(), "x", &imports).unwrap();
    let text = &unit.source_text;

    assert!(text.contains("using Site;\n"));
    assert!(text.contains("    default layout \"_Layout\";\n"));
    assert!(text.contains("    function Shout(x) => Text.Upper(x);\n"));
    assert!(!text.contains("ignored markup"));
    // Imported declarations have no template position
    assert!(!text.contains("#line"));
}

#[test]
fn test_template_directives_override_imports() {
    let imports = [
        TemplateSource::new("_imports", "@layout _Root\n@model Base\n"),
        TemplateSource::new("Admin/_imports", "@layout _Admin\n"),
    ];
    let unit = generate_with(&CodeGenerator::new(), "x", &imports).unwrap();
    assert!(unit.source_text.contains("    default layout \"_Admin\";\n"));
    assert!(unit.source_text.contains("TemplateBase<Base>\n"));

    let unit = generate_with(&CodeGenerator::new(), "@layout _Own\nx", &imports).unwrap();
    assert!(unit.source_text.contains("    layout \"_Own\";\n"));
    assert!(!unit.source_text.contains("default layout"));
    assert!(!unit.source_text.contains("_Admin"));
}

#[test]
fn test_own_functions_shadow_imported_ones() {
    let imports = [TemplateSource::new(
        "_imports",
        "@functions { Greet(x) => Text.Concat(\"Hi \", x); }\n",
    )];
    let unit = generate_with(
        &CodeGenerator::new(),
        "@functions { Greet(x) => Text.Concat(\"Yo \", x); }\n@Greet(\"a\")",
        &imports,
    )
    .unwrap();
    assert!(!unit.source_text.contains("\"Hi \""));
    assert_eq!(unit.source_text.matches("function Greet").count(), 1);
}
