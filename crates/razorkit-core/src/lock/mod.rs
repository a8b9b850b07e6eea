//! Advisory locks on compiled template artifacts
//!
//! When the compiler service persists compiled units to an artifact
//! directory, each file is written under an exclusive lock and, unless the
//! host disabled file locking, held under a shared lock for as long as the
//! loaded template lives. Locks are `fs2` advisory locks, released when the
//! [`LockGuard`] drops.

use std::path::Path;
use std::time::Duration;

mod acquire;
mod error;
mod guard;

pub use error::LockError;
pub use guard::{LockGuard, LockMode};


/// Acquires an exclusive lock on `path`, creating the file if needed.
///
/// Retries with exponential backoff until `timeout` elapses. The returned
/// guard is opened for reading and writing.
///
/// # Examples
///
/// ```no_run
/// use razorkit_core::lock::acquire_lock;
/// use std::time::Duration;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let path = std::env::temp_dir().join("Template_0123.rkt");
/// let mut guard = acquire_lock(&path, Duration::from_secs(5), "write artifact")?;
/// guard.write_all(b"{}")?;
/// # Ok(())
/// # }
/// ```
pub fn acquire_lock(
    path: &Path,
    timeout: Duration,
    description: &str,
) -> Result<LockGuard, LockError> {
    acquire::acquire_with_retry(path, LockMode::Exclusive, timeout, description)
}

/// Acquires a shared lock on an existing file.
///
/// Any number of shared holders may coexist; an exclusive holder waits for
/// all of them. Used to pin a loaded artifact so it cannot be replaced while
/// a compiled template still refers to it.
pub fn acquire_shared_lock(
    path: &Path,
    timeout: Duration,
    description: &str,
) -> Result<LockGuard, LockError> {
    acquire::acquire_with_retry(path, LockMode::Shared, timeout, description)
}
