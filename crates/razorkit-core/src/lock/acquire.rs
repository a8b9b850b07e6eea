//! Lock acquisition logic with retry and timeout

use super::{LockError, LockGuard, LockMode};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(10);
const MAX_RETRY_DELAY: Duration = Duration::from_millis(500);
const PROGRESS_MESSAGE_THRESHOLD: Duration = Duration::from_secs(2);

fn open_for(path: &Path, mode: LockMode) -> Result<File, LockError> {
    match mode {
        LockMode::Exclusive => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| LockError::io(e, path, "create artifact directory"))?;
            }
            OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(path)
                .map_err(|e| LockError::io(e, path, "open artifact for writing"))
        }
        LockMode::Shared => OpenOptions::new()
            .read(true)
            .open(path)
            .map_err(|e| LockError::io(e, path, "open artifact for reading")),
    }
}

fn try_lock(file: &File, mode: LockMode) -> std::io::Result<()> {
    match mode {
        LockMode::Exclusive => FileExt::try_lock_exclusive(file),
        LockMode::Shared => FileExt::try_lock_shared(file),
    }
}

/// Attempts to acquire a lock of the given mode with retry and timeout
pub(crate) fn acquire_with_retry(
    path: &Path,
    mode: LockMode,
    timeout: Duration,
    description: &str,
) -> Result<LockGuard, LockError> {
    let file = open_for(path, mode)?;
    let start = Instant::now();
    let mut retry_delay = INITIAL_RETRY_DELAY;
    let mut progress_shown = false;

    loop {
        match try_lock(&file, mode) {
            Ok(()) => {
                return Ok(LockGuard {
                    file,
                    path: path.to_path_buf(),
                    mode,
                });
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                let elapsed = start.elapsed();
                if elapsed >= timeout {
                    return Err(LockError::Timeout {
                        path: path.to_path_buf(),
                        description: description.to_string(),
                    });
                }

                if !progress_shown && elapsed >= PROGRESS_MESSAGE_THRESHOLD {
                    tracing::debug!(
                        path = %path.display(),
                        ?mode,
                        "waiting for artifact lock ({})",
                        description
                    );
                    progress_shown = true;
                }

                // Never sleep past the deadline
                thread::sleep(retry_delay.min(timeout.saturating_sub(elapsed)));
                retry_delay = (retry_delay * 2).min(MAX_RETRY_DELAY);
            }
            Err(e) => return Err(LockError::io(e, path, "acquire lock")),
        }
    }
}
