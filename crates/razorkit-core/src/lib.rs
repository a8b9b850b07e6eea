//! Razor-style template engine
//!
//! Templates go through a four-stage pipeline: the [`template`] code
//! generator turns markup into a generated unit, the [`compile`] service
//! builds and loads it, the [`cache`] keeps one compiled template per
//! `(key, model type)` and the [`engine`] renders it together with its
//! layouts and partials.
//!
//! ```no_run
//! use razorkit_core::{Engine, InMemorySource, ModelType};
//! use serde_json::json;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let sources = InMemorySource::new()
//!     .with("_Layout", "<body>@RenderBody()</body>")?
//!     .with("index", "@layout _Layout\nHello @Model.Name")?;
//! let engine = Engine::builder().sources(sources).build()?;
//! let html = engine.run("index", &ModelType::dynamic(), &json!({"Name": "World"}))?;
//! assert_eq!(html, "<body>Hello World</body>");
//! # Ok(())
//! # }
//! ```

// Pipeline
pub mod cache;
pub mod compile;
pub mod engine;
pub mod runtime;
pub mod template;

// Supporting modules
pub mod config;
pub mod error;
pub mod lock;
pub mod source;
pub mod types;

// Re-export commonly used types
pub use cache::{CacheEntry, CacheKey, TemplateCache};
pub use compile::{CompilationError, CompiledTemplate, CompilerService};
pub use config::{ConfigError, EngineConfig};
pub use engine::{Engine, EngineBuilder};
pub use error::{Result, TemplateError};
pub use runtime::{ExecuteContext, ExecutionCause, ExecutionError};
pub use source::{FileSystemSource, InMemorySource, SourceProvider, TemplateSource};
pub use template::{CodeGenerator, GeneratedUnit, ParseError};
pub use types::{ModelType, TemplateBaseType};
