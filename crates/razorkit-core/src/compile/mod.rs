//! Compiler service: generated unit to loaded template
//!
//! Compilation runs the [`Toolchain`] over the generated text, reports
//! warnings through `tracing`, turns errors into a [`CompilationError`]
//! mapped back to the template, and loads the resulting binary. With an
//! artifact directory the binary goes through a file on disk first.

pub mod diagnostic;
mod error;
pub mod ir;
mod loader;
pub mod reference;
pub mod toolchain;

#[cfg(test)]
mod tests;

pub use diagnostic::{Diagnostic, Location, Severity, SourceMap};
pub use error::CompilationError;
pub use loader::Program;
pub use reference::{
    default_references, Arity, DefaultReferenceResolver, Helper, Reference, ReferenceHandle,
    ReferenceResolver,
};
pub use toolchain::{BuildOutput, CompileOptions, IrToolchain, OutputKind, Toolchain};

use crate::config::consts::ARTIFACT_EXTENSION;
use crate::config::{ArtifactMode, ArtifactsConfig, ConfigError};
use crate::error::TemplateError;
use crate::lock::{self, LockError, LockGuard};
use crate::runtime::{ExecutionCause, ExecutionError, TemplateInstance};
use crate::template::GeneratedUnit;
use crate::types::{ClassName, Encoding, ModelType, TemplateBaseType, TypeContext};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Where compiled binaries are written before loading
#[derive(Debug, Clone, Default)]
pub enum ArtifactStore {
    #[default]
    Memory,
    Temp(Arc<tempfile::TempDir>),
    Directory(PathBuf),
}

impl ArtifactStore {
    pub fn from_config(config: &ArtifactsConfig) -> Result<Self, ConfigError> {
        match config.mode {
            ArtifactMode::Memory => Ok(Self::Memory),
            ArtifactMode::Temp => {
                let dir = match &config.path {
                    Some(parent) => {
                        std::fs::create_dir_all(parent).map_err(ConfigError::ArtifactDir)?;
                        tempfile::Builder::new()
                            .prefix("razorkit-")
                            .tempdir_in(parent)
                    }
                    None => tempfile::Builder::new().prefix("razorkit-").tempdir(),
                }
                .map_err(ConfigError::ArtifactDir)?;
                Ok(Self::Temp(Arc::new(dir)))
            }
            ArtifactMode::Directory => {
                let path = config.path.clone().ok_or_else(|| {
                    ConfigError::invalid("compiler.artifacts.path", "required when mode = \"directory\"")
                })?;
                std::fs::create_dir_all(&path).map_err(ConfigError::ArtifactDir)?;
                Ok(Self::Directory(path))
            }
        }
    }

    pub fn dir(&self) -> Option<&Path> {
        match self {
            ArtifactStore::Memory => None,
            ArtifactStore::Temp(dir) => Some(dir.path()),
            ArtifactStore::Directory(path) => Some(path),
        }
    }
}

/// A compiled binary persisted on disk
#[derive(Debug)]
pub struct Artifact {
    path: PathBuf,
    /// Held while the template lives unless temp file locking is disabled
    lock: Option<LockGuard>,
}

impl Artifact {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_some()
    }
}

/// A loaded template: the factory for [`TemplateInstance`]s
#[derive(Debug)]
pub struct CompiledTemplate {
    template: String,
    class_name: ClassName,
    model_type: ModelType,
    program: Program,
    source_map: Option<SourceMap>,
    artifact: Option<Artifact>,
    source_digest: Option<String>,
}

impl CompiledTemplate {
    /// Key of the template this was compiled from
    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn class_name(&self) -> &ClassName {
        &self.class_name
    }

    /// Model type requested when compiling
    pub fn model_type(&self) -> &ModelType {
        &self.model_type
    }

    /// Layout declared by the template or inherited from an import file
    pub fn layout(&self) -> Option<&str> {
        self.program.module().layout.as_deref()
    }

    /// Whether [`layout`](Self::layout) came from an import file
    pub fn layout_is_inherited(&self) -> bool {
        self.program.module().layout_inherited
    }

    pub fn encoding(&self) -> Encoding {
        self.program.encoding()
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn source_map(&self) -> Option<&SourceMap> {
        self.source_map.as_ref()
    }

    pub fn artifact(&self) -> Option<&Artifact> {
        self.artifact.as_ref()
    }

    /// SHA-256 of the template text this was compiled from, when the caller
    /// recorded it
    pub fn source_digest(&self) -> Option<&str> {
        self.source_digest.as_deref()
    }

    pub(crate) fn with_source_digest(mut self, digest: String) -> Self {
        self.source_digest = Some(digest);
        self
    }

    /// A fresh instance bound to `model`
    pub fn instantiate(self: &Arc<Self>, model: Value) -> TemplateInstance {
        TemplateInstance::new(Arc::clone(self), model)
    }
}

pub struct CompilerService {
    toolchain: Arc<dyn Toolchain>,
    resolver: Arc<dyn ReferenceResolver>,
    default_references: Vec<ReferenceHandle>,
    base_types: Vec<TemplateBaseType>,
    artifacts: ArtifactStore,
    disable_temp_file_locking: bool,
    lock_timeout: Duration,
    debug: bool,
    sequence: AtomicU64,
}

impl CompilerService {
    pub fn new(toolchain: Arc<dyn Toolchain>) -> Self {
        Self {
            toolchain,
            resolver: Arc::new(DefaultReferenceResolver),
            default_references: default_references(),
            base_types: TemplateBaseType::builtins(),
            artifacts: ArtifactStore::Memory,
            disable_temp_file_locking: true,
            lock_timeout: Duration::from_millis(5000),
            debug: false,
            sequence: AtomicU64::new(0),
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn ReferenceResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_default_references(mut self, references: Vec<ReferenceHandle>) -> Self {
        self.default_references = references;
        self
    }

    pub fn with_base_types(mut self, base_types: Vec<TemplateBaseType>) -> Self {
        self.base_types = base_types;
        self
    }

    pub fn with_artifacts(mut self, artifacts: ArtifactStore) -> Self {
        self.artifacts = artifacts;
        self
    }

    pub fn with_temp_file_locking_disabled(mut self, disabled: bool) -> Self {
        self.disable_temp_file_locking = disabled;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn base_types(&self) -> &[TemplateBaseType] {
        &self.base_types
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    /// Compiles and loads `unit`
    pub fn compile(
        &self,
        unit: &GeneratedUnit,
        context: &TypeContext,
    ) -> Result<CompiledTemplate, TemplateError> {
        let started = Instant::now();
        let references = self.resolver.resolve(context, &self.default_references);
        let options = CompileOptions {
            output: OutputKind::Library,
            usings: context.namespaces.iter().cloned().collect(),
            model_type: context.model_type.clone(),
            base_types: self.base_types.clone(),
            debug: self.debug,
        };

        let output = self
            .toolchain
            .build(&unit.source_text, &options, &references);
        let source_map = Some(SourceMap::from_generated(&unit.source_text))
            .filter(|map| !map.is_empty());

        for diagnostic in output.diagnostics.iter().filter(|d| !d.is_error()) {
            let location = locate(&unit.template, diagnostic, source_map.as_ref());
            match diagnostic.severity {
                Severity::Warning => warn!(
                    template = %unit.template,
                    code = %diagnostic.code,
                    location = %location,
                    "{}",
                    diagnostic.message
                ),
                _ => debug!(
                    template = %unit.template,
                    code = %diagnostic.code,
                    "{}",
                    diagnostic.message
                ),
            }
        }

        let binary = match output.binary {
            Some(binary) if !output.diagnostics.iter().any(Diagnostic::is_error) => binary,
            _ => {
                let mut diagnostics = output.diagnostics;
                if !diagnostics.iter().any(Diagnostic::is_error) {
                    diagnostics.push(Diagnostic::error(
                        diagnostic::codes::EMIT_FAILED,
                        None,
                        "The toolchain produced no binary",
                    ));
                }
                let first_error = diagnostics
                    .iter()
                    .find(|d| d.is_error())
                    .map(|d| locate(&unit.template, d, source_map.as_ref()))
                    .unwrap_or(Location::Unknown);
                return Err(TemplateError::Compilation(CompilationError {
                    template: unit.template.clone(),
                    diagnostics,
                    first_error,
                    generated_source: Arc::from(unit.source_text.as_str()),
                }));
            }
        };

        let fail = |cause| TemplateError::Execution(ExecutionError::new(&unit.template, None, cause));
        let (bytes, artifact) = match self.artifacts.dir() {
            Some(dir) => {
                let (bytes, artifact) = self.persist(dir, &unit.class_name, &binary).map_err(fail)?;
                (bytes, Some(artifact))
            }
            None => (binary, None),
        };
        let program = loader::load(&bytes, &references, &self.base_types).map_err(fail)?;

        info!(
            template = %unit.template,
            class = %unit.class_name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "compiled template"
        );

        Ok(CompiledTemplate {
            template: unit.template.clone(),
            class_name: unit.class_name.clone(),
            model_type: context.model_type.clone(),
            program,
            source_map,
            artifact,
            source_digest: None,
        })
    }

    /// Writes the binary to a fresh artifact file and reads it back
    fn persist(
        &self,
        dir: &Path,
        class_name: &ClassName,
        binary: &[u8],
    ) -> Result<(Vec<u8>, Artifact), ExecutionCause> {
        let path = self.artifact_path(dir, class_name)?;
        let artifact_error = |e: LockError| ExecutionCause::ArtifactIo {
            path: path.clone(),
            message: e.to_string(),
        };
        let io_error = |e: std::io::Error| ExecutionCause::ArtifactIo {
            path: path.clone(),
            message: e.to_string(),
        };

        {
            let mut guard = lock::acquire_lock(&path, self.lock_timeout, "write compiled template")
                .map_err(artifact_error)?;
            guard.write_all(binary).map_err(io_error)?;
        }

        let mut shared = lock::acquire_shared_lock(&path, self.lock_timeout, "load compiled template")
            .map_err(artifact_error)?;
        let bytes = shared.read_all().map_err(io_error)?;
        let lock = if self.disable_temp_file_locking {
            None
        } else {
            Some(shared)
        };
        debug!(path = %path.display(), locked = lock.is_some(), "persisted artifact");

        Ok((bytes, Artifact { path, lock }))
    }

    /// `<ClassName>-<nonce>.rkt`, never an existing file
    fn artifact_path(&self, dir: &Path, class_name: &ClassName) -> Result<PathBuf, ExecutionCause> {
        for _ in 0..16 {
            let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
            let mut hasher = Sha256::new();
            hasher.update(class_name.as_str().as_bytes());
            hasher.update(std::process::id().to_le_bytes());
            hasher.update(sequence.to_le_bytes());
            hasher.update(chrono::Utc::now().timestamp_micros().to_le_bytes());
            let digest = format!("{:x}", hasher.finalize());

            let path = dir.join(format!(
                "{}-{}.{}",
                class_name,
                &digest[..12],
                ARTIFACT_EXTENSION
            ));
            if !path.exists() {
                return Ok(path);
            }
        }
        Err(ExecutionCause::ArtifactIo {
            path: dir.to_path_buf(),
            message: "could not find an unused artifact file name".to_string(),
        })
    }
}

fn locate(template: &str, diagnostic: &Diagnostic, source_map: Option<&SourceMap>) -> Location {
    let Some(position) = diagnostic.position else {
        return Location::Unknown;
    };
    match source_map.and_then(|map| map.map(position)) {
        Some(position) => Location::Template {
            template: template.to_string(),
            position,
        },
        None => Location::Generated(position),
    }
}
