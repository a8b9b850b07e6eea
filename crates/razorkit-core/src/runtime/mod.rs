//! Render-time machinery: execute context, template instances, values

pub mod context;
mod error;
pub mod instance;
pub(crate) mod value;

#[cfg(test)]
mod tests;

pub use context::{BodyWriter, ExecuteContext, FrameGuard};
pub use error::{ExecutionCause, ExecutionError};
pub use instance::{RenderHost, SectionAction, TemplateInstance};
