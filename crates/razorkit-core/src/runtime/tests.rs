use super::*;
use crate::compile::{CompiledTemplate, CompilerService, IrToolchain};
use crate::error::TemplateError;
use crate::source::TemplateSource;
use crate::template::CodeGenerator;
use crate::types::{ClassName, ModelType, SourcePos, TemplateBaseType, TypeContext};
use serde_json::{json, Value};
use std::cell::RefCell;
use std::sync::Arc;

fn compile(key: &str, content: &str) -> Arc<CompiledTemplate> {
    let model_type = ModelType::dynamic();
    let context = TypeContext::new(
        ClassName::for_template(key, &model_type),
        TemplateBaseType::html(),
        model_type,
    );
    let unit = CodeGenerator::new()
        .generate(&TemplateSource::new(key, content), &[], &context)
        .unwrap();
    Arc::new(
        CompilerService::new(Arc::new(IrToolchain))
            .compile(&unit, &context)
            .unwrap(),
    )
}

/// Records includes and answers them with a fixed marker
#[derive(Default)]
struct RecordingHost {
    includes: RefCell<Vec<(String, String, Value)>>,
}

impl RenderHost for RecordingHost {
    fn include(
        &self,
        key: &str,
        model_type: &ModelType,
        model: Value,
    ) -> Result<String, TemplateError> {
        self.includes
            .borrow_mut()
            .push((key.to_string(), model_type.name().to_string(), model));
        Ok(format!("<partial {}>", key))
    }
}

fn render(content: &str, model: Value) -> Result<String, TemplateError> {
    let compiled = compile("test", content);
    let mut context = ExecuteContext::new();
    compiled
        .instantiate(model)
        .execute(&mut context, &RecordingHost::default())
}

fn cause_of(result: Result<String, TemplateError>) -> ExecutionCause {
    match result {
        Err(TemplateError::Execution(error)) => error.cause,
        other => panic!("expected an execution error, got {:?}", other),
    }
}

#[test]
fn test_emits_encoded_values() {
    let output = render("Hello @Model.Name!", json!({"Name": "<World>"})).unwrap();
    assert_eq!(output, "Hello &lt;World&gt;!");
}

#[test]
fn test_raw_base_and_raw_builtin_skip_encoding() {
    let raw = render("@inherits RawTemplateBase\n@Model.Html", json!({"Html": "<b>"})).unwrap();
    assert_eq!(raw, "<b>");

    let marked = render("@Raw(Model.Html)", json!({"Html": "<b>"})).unwrap();
    assert_eq!(marked, "<b>");
}

#[test]
fn test_conditionals() {
    let template = "@if (Model.Admin) {admin} else if (Model.Name == \"guest\") {guest} else {user}";
    assert_eq!(render(template, json!({"Admin": true, "Name": "x"})).unwrap(), "admin");
    assert_eq!(render(template, json!({"Admin": false, "Name": "guest"})).unwrap(), "guest");
    assert_eq!(render(template, json!({"Admin": null, "Name": "x"})).unwrap(), "user");
}

#[test]
fn test_foreach_over_arrays_and_objects() {
    let output = render(
        "@foreach (var tag in Model.Tags) {[@tag]}",
        json!({"Tags": ["a", "b"]}),
    )
    .unwrap();
    assert_eq!(output, "[a][b]");

    let output = render(
        "@foreach (var pair in Model.Scores) {@pair.Key=@pair.Value;}",
        json!({"Scores": {"b": 2, "a": 1}}),
    )
    .unwrap();
    assert_eq!(output, "a=1;b=2;");
}

#[test]
fn test_locals_and_functions() {
    let output = render(
        "@functions { Greet(name) => Text.Concat(\"Hi \", name); }\n@{ var who = Model.Name; }@Greet(who)",
        json!({"Name": "Ann"}),
    )
    .unwrap();
    assert_eq!(output, "Hi Ann");
}

#[test]
fn test_missing_member_reports_template_position() {
    let result = render("<p>\n  @Model.Address.City</p>", json!({"Name": "x"}));
    let Err(TemplateError::Execution(error)) = result else {
        panic!("expected an execution error");
    };
    assert_eq!(error.template, "test");
    assert_eq!(error.location, Some(SourcePos::new(2, 4)));
    assert_eq!(
        error.cause,
        ExecutionCause::MemberNotFound {
            target: "Model".into(),
            member: "Address".into()
        }
    );
}

#[test]
fn test_not_iterable_and_not_printable() {
    assert_eq!(
        cause_of(render("@foreach (var x in Model.N) {x}", json!({"N": 3}))),
        ExecutionCause::NotIterable {
            kind: "number".into()
        }
    );
    assert_eq!(
        cause_of(render("@Model.List", json!({"List": [1]}))),
        ExecutionCause::NotPrintable {
            kind: "array".into()
        }
    );
}

#[test]
fn test_helper_failure() {
    assert!(matches!(
        cause_of(render("@Text.Join(Model.N, \",\")", json!({"N": 1}))),
        ExecutionCause::HelperFailed { helper, .. } if helper == "Text.Join"
    ));
}

#[test]
fn test_recursion_limit() {
    assert_eq!(
        cause_of(render("@functions { Loop(x) => Loop(x); }\n@Loop(1)", json!({}))),
        ExecutionCause::RecursionLimit {
            depth: crate::config::consts::limits::MAX_CALL_DEPTH
        }
    );
}

#[test]
fn test_render_body_outside_layout() {
    assert_eq!(
        cause_of(render("@RenderBody()", json!({}))),
        ExecutionCause::BodyUnavailable
    );
}

#[test]
fn test_sections_register_with_captured_locals() {
    let child = compile("child", "@{ var who = Model.Name; }@section Foot {bye @who}main");
    let layout = compile(
        "layout",
        "[@RenderBody()]@if (IsSectionDefined(\"Foot\")) {(@RenderSection(\"Foot\"))}@RenderSection(\"Missing\")",
    );
    let host = RecordingHost::default();
    let mut context = ExecuteContext::new();

    let output = context.enter_nested_render(|context| -> Result<String, TemplateError> {
        let body = child
            .instantiate(json!({"Name": "Ann"}))
            .execute(context, &host)?;
        assert!(context.is_section_defined("Foot"));
        context.enter_nested_render(|context| {
            context.push_body_writer(BodyWriter::new("child", body));
            layout.instantiate(json!({})).execute(context, &host)
        })
    });

    assert_eq!(output.unwrap(), "[main](bye Ann)");
    assert!(!context.is_section_defined("Foot"));
}

#[test]
fn test_required_section_missing() {
    assert_eq!(
        cause_of(render("@RenderSection(\"Scripts\", true)", json!({}))),
        ExecutionCause::RequiredSectionMissing {
            name: "Scripts".into()
        }
    );
}

#[test]
fn test_include_passes_model() {
    let compiled = compile("page", "@Include(\"header\")|@Include(\"item\", Model.Item)");
    let host = RecordingHost::default();
    let output = compiled
        .instantiate(json!({"Item": {"Id": 1}}))
        .execute(&mut ExecuteContext::new(), &host)
        .unwrap();

    assert_eq!(output, "<partial header>|<partial item>");
    let includes = host.includes.borrow();
    assert_eq!(includes[0].0, "header");
    assert_eq!(includes[0].2, json!({"Item": {"Id": 1}}));
    assert_eq!(includes[1], ("item".to_string(), "dynamic".to_string(), json!({"Id": 1})));
}
