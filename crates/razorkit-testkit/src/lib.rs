//! Test utilities for razorkit
//!
//! Shared helpers for the razorkit workspace: scratch directories under the
//! project's `.tmp/`, template trees on disk and an instrumented toolchain.
//!
//! `razorkit-core` unit tests only use the directory helpers; the helpers
//! that take or return core types are meant for integration tests.

pub mod fixtures;
pub mod toolchain;

pub use fixtures::TemplateTree;
pub use toolchain::CountingToolchain;

use tempfile::TempDir;

/// Creates a temporary directory within `.tmp/` at the project root
///
/// This keeps test artifacts in one gitignored location that is easy to
/// clean up by hand.
///
/// # Panics
///
/// Panics if the current directory cannot be determined or the directory
/// cannot be created.
///
/// # Examples
///
/// ```rust
/// use razorkit_testkit::temp_dir_in_workspace;
///
/// let temp = temp_dir_in_workspace();
/// let file_path = temp.path().join("index.cshtml");
/// std::fs::write(&file_path, "Hello @Model.Name").unwrap();
/// // Cleanup happens automatically when temp is dropped
/// ```
pub fn temp_dir_in_workspace() -> TempDir {
    try_temp_dir_in_workspace().expect("Failed to create temporary directory in .tmp/")
}

/// Alternative with Result for non-test code
pub fn try_temp_dir_in_workspace() -> std::io::Result<TempDir> {
    let workspace_root = std::env::current_dir()?;
    let tmp_base = workspace_root.join(".tmp");
    std::fs::create_dir_all(&tmp_base)?;
    TempDir::new_in(&tmp_base)
}
