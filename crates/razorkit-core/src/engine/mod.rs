//! Template runner
//!
//! [`Engine`] ties the pipeline together: it reads templates from a
//! [`SourceProvider`], compiles them on cache misses and renders them,
//! following layout declarations and `Include` calls.
//!
//! A render of a template with a layout first runs the template in its own
//! frame, then renders the layout in a nested frame with the template's
//! output installed as the body. Sections the template defined stay visible
//! to the layout.
//!
//! A layout inherited from an import file applies to pages only. Layouts and
//! partials follow the layouts they declare themselves.

mod chain;


pub use chain::RenderChain;

use crate::cache::{CacheKey, TemplateCache};
use crate::compile::{
    ArtifactStore, CompiledTemplate, CompilerService, DefaultReferenceResolver, IrToolchain,
    ReferenceHandle, ReferenceResolver, Toolchain,
};
use crate::config::{ConfigError, EngineConfig};
use crate::error::TemplateError;
use crate::runtime::{
    BodyWriter, ExecuteContext, ExecutionCause, ExecutionError, RenderHost,
};
use crate::source::{normalize_key, InMemorySource, SourceError, SourceProvider, TemplateSource};
use crate::template::CodeGenerator;
use crate::types::{ClassName, ModelType, TemplateBaseType, TypeContext};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// What a template is being rendered as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Page,
    Layout,
    Partial,
}

pub struct Engine {
    config: EngineConfig,
    sources: Arc<dyn SourceProvider>,
    generator: CodeGenerator,
    compiler: CompilerService,
    cache: TemplateCache,
    base_type: TemplateBaseType,
    references: Vec<ReferenceHandle>,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &TemplateCache {
        &self.cache
    }

    /// Renders the template `key` with `model`
    pub fn run(
        &self,
        key: &str,
        model_type: &ModelType,
        model: &Value,
    ) -> Result<String, TemplateError> {
        let chain = self.root_chain().enter(key)?;
        let compiled = self.load(key, model_type)?;
        self.render(compiled, model_type, model.clone(), &chain, Role::Page)
    }

    /// Renders `content` as the template `key`.
    ///
    /// The compiled result is cached under `key`; once cached, later calls
    /// reuse it and log a warning when `content` differs. Layouts and
    /// partials still come from the source provider.
    pub fn run_compile(
        &self,
        key: &str,
        content: &str,
        model_type: &ModelType,
        model: &Value,
    ) -> Result<String, TemplateError> {
        let chain = self.root_chain().enter(key)?;
        let cache_key = CacheKey::new(key, model_type);
        let compiled = self.cache.get_or_compile(&cache_key, || {
            let source = TemplateSource::new(key, content);
            let imports = self.imports_for(key)?;
            self.compile_source(&source, &imports, model_type)
        })?;
        if compiled.source_digest() != Some(content_digest(content).as_str()) {
            warn!(
                template = key,
                "content differs from the cached compilation; invalidate the key to recompile"
            );
        }
        self.render(compiled, model_type, model.clone(), &chain, Role::Page)
    }

    /// Compiles `key` into the cache without rendering it
    pub fn compile(&self, key: &str, model_type: &ModelType) -> Result<(), TemplateError> {
        self.load(key, model_type).map(|_| ())
    }

    pub fn is_template_cached(&self, key: &str, model_type: &ModelType) -> bool {
        self.cache.contains(&CacheKey::new(key, model_type))
    }

    /// Drops every cached compilation of `key`
    pub fn invalidate(&self, key: &str) -> usize {
        self.cache.invalidate(key)
    }

    fn root_chain(&self) -> RenderChain {
        RenderChain::new(self.config.runtime.max_layout_depth)
    }

    /// The compiled template for `(key, model_type)`, from the cache or the
    /// source provider
    fn load(
        &self,
        key: &str,
        model_type: &ModelType,
    ) -> Result<Arc<CompiledTemplate>, TemplateError> {
        let cache_key = CacheKey::new(key, model_type);
        self.cache.get_or_compile(&cache_key, || {
            let source = self.read_source(key)?;
            let imports = self.imports_for(key)?;
            self.compile_source(&source, &imports, model_type)
        })
    }

    fn compile_source(
        &self,
        source: &TemplateSource,
        imports: &[TemplateSource],
        model_type: &ModelType,
    ) -> Result<CompiledTemplate, TemplateError> {
        let context = TypeContext::new(
            ClassName::for_template(&source.key, model_type),
            self.base_type.clone(),
            model_type.clone(),
        )
        .with_namespaces(self.config.compiler.namespaces.iter().cloned())
        .with_references(self.references.clone());

        let unit = self.generator.generate(source, imports, &context)?;
        let compiled = self.compiler.compile(&unit, &context)?;
        Ok(compiled.with_source_digest(content_digest(&source.content)))
    }

    fn read_source(&self, key: &str) -> Result<TemplateSource, TemplateError> {
        let item = self
            .sources
            .get_item(key)
            .map_err(|e| source_failure(key, e))?;
        if !item.exists() {
            return Err(not_found(key));
        }
        item.read().map_err(|e| source_failure(key, e))
    }

    fn imports_for(&self, key: &str) -> Result<Vec<TemplateSource>, TemplateError> {
        self.sources
            .find_hierarchical_imports(key, &self.config.source.imports_file_name)
            .iter()
            .map(|item| item.read().map_err(|e| source_failure(item.key(), e)))
            .collect()
    }

    /// Renders a compiled template and its layouts with a fresh context
    fn render(
        &self,
        compiled: Arc<CompiledTemplate>,
        model_type: &ModelType,
        model: Value,
        chain: &RenderChain,
        role: Role,
    ) -> Result<String, TemplateError> {
        let mut context = ExecuteContext::new();
        context.enter_nested_render(|context| {
            self.render_in(compiled, model_type, model, chain, role, context)
        })
    }

    /// Runs `compiled` in the current frame, then its layout chain.
    /// `chain` already contains `compiled`'s key.
    fn render_in(
        &self,
        compiled: Arc<CompiledTemplate>,
        model_type: &ModelType,
        model: Value,
        chain: &RenderChain,
        role: Role,
        context: &mut ExecuteContext,
    ) -> Result<String, TemplateError> {
        let host = EngineHost {
            engine: self,
            chain,
        };
        let body = compiled
            .instantiate(model.clone())
            .execute(context, &host)?;

        let Some(layout_key) = layout_to_follow(&compiled, role) else {
            return Ok(body);
        };
        let layout_chain = chain.enter(layout_key)?;
        debug!(
            template = compiled.template(),
            layout = layout_key,
            depth = layout_chain.depth(),
            "rendering layout"
        );
        let layout = self.load(layout_key, model_type)?;

        context.enter_nested_render(|context| {
            context.push_body_writer(BodyWriter::new(compiled.template(), body));
            let rendered = self.render_in(
                layout,
                model_type,
                model,
                &layout_chain,
                Role::Layout,
                context,
            );
            context.pop_body_writer();
            rendered
        })
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

/// Partials rendered from inside a template
struct EngineHost<'a> {
    engine: &'a Engine,
    chain: &'a RenderChain,
}

impl RenderHost for EngineHost<'_> {
    fn include(
        &self,
        key: &str,
        model_type: &ModelType,
        model: Value,
    ) -> Result<String, TemplateError> {
        let chain = self.chain.enter_partial(key)?;
        debug!(template = key, depth = chain.depth(), "rendering partial");
        let compiled = self.engine.load(key, model_type)?;
        self.engine.render(compiled, model_type, model, &chain, Role::Partial)
    }
}

fn content_digest(content: &str) -> String {
    format!("{:x}", Sha256::digest(content.as_bytes()))
}

/// The layout `compiled` renders into when rendered as `role`
fn layout_to_follow(compiled: &CompiledTemplate, role: Role) -> Option<&str> {
    let layout = compiled.layout()?;
    if !compiled.layout_is_inherited() {
        return Some(layout);
    }
    let names_itself = normalize_key(layout)
        .is_ok_and(|key| Some(key) == normalize_key(compiled.template()).ok());
    (role == Role::Page && !names_itself).then_some(layout)
}

fn not_found(key: &str) -> TemplateError {
    TemplateError::Execution(ExecutionError::new(
        key,
        None,
        ExecutionCause::TemplateNotFound {
            key: key.to_string(),
        },
    ))
}

fn source_failure(key: &str, error: SourceError) -> TemplateError {
    match error {
        SourceError::NotFound { .. } => not_found(key),
        other => TemplateError::Execution(ExecutionError::new(
            key,
            None,
            ExecutionCause::SourceUnreadable {
                key: key.to_string(),
                message: other.to_string(),
            },
        )),
    }
}

/// Builds an [`Engine`]. Everything is optional: without a source provider
/// the engine starts with an empty [`InMemorySource`], which still serves
/// [`Engine::run_compile`].
#[derive(Default)]
pub struct EngineBuilder {
    config: EngineConfig,
    sources: Option<Arc<dyn SourceProvider>>,
    resolver: Option<Arc<dyn ReferenceResolver>>,
    toolchain: Option<Arc<dyn Toolchain>>,
    references: Vec<ReferenceHandle>,
    base_types: Vec<TemplateBaseType>,
    debug: bool,
}

impl EngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn sources(mut self, sources: impl SourceProvider + 'static) -> Self {
        let sources: Arc<dyn SourceProvider> = Arc::new(sources);
        self.sources = Some(sources);
        self
    }

    pub fn shared_sources(mut self, sources: Arc<dyn SourceProvider>) -> Self {
        self.sources = Some(sources);
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn ReferenceResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn toolchain(mut self, toolchain: Arc<dyn Toolchain>) -> Self {
        self.toolchain = Some(toolchain);
        self
    }

    /// A helper library offered to every template, besides `Text` and `Html`
    pub fn reference(mut self, reference: ReferenceHandle) -> Self {
        self.references.push(reference);
        self
    }

    /// A base type templates may inherit from, besides the built-ins
    pub fn base_type(mut self, base_type: TemplateBaseType) -> Self {
        self.base_types.push(base_type);
        self
    }

    /// Emit human-readable binaries
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn build(self) -> Result<Engine, ConfigError> {
        let config = self.config;
        config.validate()?;

        let mut base_types = TemplateBaseType::builtins();
        for custom in self.base_types {
            base_types.retain(|existing| existing.name != custom.name);
            base_types.push(custom);
        }
        let base_type = base_types
            .iter()
            .find(|base| base.name == config.compiler.base_type)
            .cloned()
            .ok_or_else(|| {
                ConfigError::invalid(
                    "compiler.base_type",
                    format!("unknown base type '{}'", config.compiler.base_type),
                )
            })?;

        let toolchain: Arc<dyn Toolchain> = match self.toolchain {
            Some(toolchain) => toolchain,
            None => Arc::new(IrToolchain),
        };
        let resolver: Arc<dyn ReferenceResolver> = match self.resolver {
            Some(resolver) => resolver,
            None => Arc::new(DefaultReferenceResolver),
        };
        let sources: Arc<dyn SourceProvider> = match self.sources {
            Some(sources) => sources,
            None => Arc::new(InMemorySource::new()),
        };

        let artifacts = ArtifactStore::from_config(&config.compiler.artifacts)?;
        let compiler = CompilerService::new(toolchain)
            .with_resolver(resolver)
            .with_base_types(base_types.clone())
            .with_artifacts(artifacts)
            .with_temp_file_locking_disabled(config.compiler.disable_temp_file_locking)
            .with_lock_timeout(Duration::from_millis(config.compiler.lock_timeout_ms))
            .with_debug(self.debug);

        let generator = CodeGenerator::new()
            .with_line_pragmas(config.compiler.emit_line_pragmas)
            .with_base_types(base_types);

        Ok(Engine {
            sources,
            generator,
            compiler,
            cache: TemplateCache::new(),
            base_type,
            references: self.references,
            config,
        })
    }
}
