use super::*;
use crate::source::TemplateSource;
use crate::template::CodeGenerator;
use crate::types::SourcePos;

fn context(key: &str) -> TypeContext {
    TypeContext::new(
        ClassName::for_template(key, &ModelType::dynamic()),
        TemplateBaseType::html(),
        ModelType::dynamic(),
    )
}

fn generate(key: &str, content: &str) -> (GeneratedUnit, TypeContext) {
    let context = context(key);
    let unit = CodeGenerator::new()
        .generate(&TemplateSource::new(key, content), &[], &context)
        .unwrap();
    (unit, context)
}

fn service() -> CompilerService {
    CompilerService::new(Arc::new(IrToolchain))
}

#[test]
fn test_compile_in_memory() {
    let (unit, context) = generate("index", "@layout _Layout\nHello @Model.Name");
    let compiled = service().compile(&unit, &context).unwrap();

    assert_eq!(compiled.template(), "index");
    assert_eq!(compiled.class_name(), &unit.class_name);
    assert_eq!(compiled.layout(), Some("_Layout"));
    assert_eq!(compiled.encoding(), Encoding::Html);
    assert!(compiled.source_map().is_some());
    assert!(compiled.artifact().is_none());
}

#[test]
fn test_compile_error_maps_to_template_position() {
    let (unit, context) = generate("broken", "<p>\nHello @Modle.Name</p>");
    let err = service().compile(&unit, &context).unwrap_err();

    let TemplateError::Compilation(error) = err else {
        panic!("expected a compilation error, got {:?}", err);
    };
    assert_eq!(error.template, "broken");
    assert_eq!(error.first().unwrap().code, diagnostic::codes::UNKNOWN_NAME);
    assert_eq!(
        error.first_error,
        Location::Template {
            template: "broken".into(),
            position: SourcePos::new(2, 8),
        }
    );
    assert_eq!(&*error.generated_source, unit.source_text.as_str());
}

#[test]
fn test_compile_error_without_pragmas_reports_generated_position() {
    let context = context("plain");
    let unit = CodeGenerator::new()
        .with_line_pragmas(false)
        .generate(&TemplateSource::new("plain", "@Modle"), &[], &context)
        .unwrap();
    let err = service().compile(&unit, &context).unwrap_err();

    let TemplateError::Compilation(error) = err else {
        panic!("expected a compilation error");
    };
    assert!(matches!(error.first_error, Location::Generated(_)));
}

#[test]
fn test_directory_artifacts_are_written_and_locked() {
    let dir = tempfile::tempdir().unwrap();
    let service = service()
        .with_artifacts(ArtifactStore::Directory(dir.path().to_path_buf()))
        .with_temp_file_locking_disabled(false);

    let (unit, context) = generate("page", "hi");
    let first = service.compile(&unit, &context).unwrap();
    let second = service.compile(&unit, &context).unwrap();

    let a = first.artifact().unwrap();
    let b = second.artifact().unwrap();
    assert!(a.is_locked());
    assert_ne!(a.path(), b.path());
    assert!(a.path().starts_with(dir.path()));
    assert_eq!(
        a.path().extension().and_then(|e| e.to_str()),
        Some(ARTIFACT_EXTENSION)
    );
    let file_name = a.path().file_name().unwrap().to_string_lossy().into_owned();
    assert!(file_name.starts_with(unit.class_name.as_str()));
}

#[test]
fn test_artifact_lock_released_when_locking_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let service = service().with_artifacts(ArtifactStore::Directory(dir.path().to_path_buf()));

    let (unit, context) = generate("page", "hi");
    let compiled = service.compile(&unit, &context).unwrap();
    let artifact = compiled.artifact().unwrap();
    assert!(!artifact.is_locked());

    // Nothing pins the file, so an exclusive lock is immediately available
    let guard = lock::acquire_lock(artifact.path(), Duration::from_millis(100), "test");
    assert!(guard.is_ok());
}

#[test]
fn test_artifact_store_from_config() {
    let dir = tempfile::tempdir().unwrap();

    let memory = ArtifactStore::from_config(&ArtifactsConfig::default()).unwrap();
    assert!(memory.dir().is_none());

    let temp = ArtifactStore::from_config(&ArtifactsConfig {
        mode: ArtifactMode::Temp,
        path: Some(dir.path().to_path_buf()),
    })
    .unwrap();
    assert!(temp.dir().unwrap().starts_with(dir.path()));

    let nested = dir.path().join("out").join("artifacts");
    let directory = ArtifactStore::from_config(&ArtifactsConfig {
        mode: ArtifactMode::Directory,
        path: Some(nested.clone()),
    })
    .unwrap();
    assert_eq!(directory.dir(), Some(nested.as_path()));
    assert!(nested.is_dir());

    let missing = ArtifactStore::from_config(&ArtifactsConfig {
        mode: ArtifactMode::Directory,
        path: None,
    });
    assert!(matches!(missing, Err(ConfigError::InvalidValue { .. })));
}

#[test]
fn test_warnings_do_not_fail_compilation() {
    let (unit, context) = generate("warn", "@using Nowhere\nok");
    assert!(service().compile(&unit, &context).is_ok());
}
