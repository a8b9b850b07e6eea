//! RAII lock guard for artifact files

use fs2::FileExt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Kind of advisory lock held by a [`LockGuard`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// Holds an advisory lock on an artifact file until dropped
#[derive(Debug)]
pub struct LockGuard {
    pub(crate) file: File,
    pub(crate) path: PathBuf,
    pub(crate) mode: LockMode,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }

    /// Reads the whole file from the beginning.
    pub fn read_all(&mut self) -> io::Result<Vec<u8>> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut bytes = Vec::new();
        self.file.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    /// Replaces the file contents. Only valid for exclusive guards.
    pub fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        if self.mode != LockMode::Exclusive {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "artifact is held under a shared lock",
            ));
        }
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(bytes)?;
        self.file.sync_data()
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // Closing the descriptor would release the lock as well; unlocking
        // first keeps release ordering independent of when the File drops.
        let _ = FileExt::unlock(&self.file);
    }
}
