//! Names shared by the generator, the toolchain and the runner

/// Namespace every generated unit is placed in
pub const GENERATED_NAMESPACE: &str = "CompiledTemplates.Dynamic";

/// File extension of compiled artifacts on disk
pub const ARTIFACT_EXTENSION: &str = "rkt";

/// Version written into compiled binaries; loading a different version fails
pub const BINARY_FORMAT_VERSION: u32 = 1;

/// Limits applied while rendering
pub mod limits {
    /// Default maximum length of a layout chain
    pub const MAX_LAYOUT_DEPTH: usize = 16;

    /// Maximum nesting of template-local function calls
    pub const MAX_CALL_DEPTH: usize = 64;
}
