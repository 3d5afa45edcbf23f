//! Cross-process exclusion around a store transaction.
//!
//! On unix the lock is taken on the directory holding the store, so nothing
//! besides the store file is left on disk. Elsewhere a directory cannot be
//! opened as a file, and an empty `<store>.lock` sibling is used instead.

use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, VaultError};

/// Exclusive advisory lock for one store, held until dropped.
#[derive(Debug)]
pub struct StoreLock {
    file: File,
    path: PathBuf,
}

impl StoreLock {
    /// Path whose descriptor carries the lock for `store_path`.
    #[cfg(unix)]
    pub fn path_for(store_path: &Path) -> PathBuf {
        match store_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Path whose descriptor carries the lock for `store_path`.
    #[cfg(not(unix))]
    pub fn path_for(store_path: &Path) -> PathBuf {
        let mut name = store_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        store_path.with_file_name(name)
    }

    #[cfg(unix)]
    fn open(path: &Path) -> std::io::Result<File> {
        File::open(path)
    }

    #[cfg(not(unix))]
    fn open(path: &Path) -> std::io::Result<File> {
        std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)
    }

    /// Block until the store's lock is held exclusively. The store's
    /// directory must already exist.
    pub fn acquire(store_path: &Path) -> Result<Self> {
        let path = Self::path_for(store_path);
        let file = Self::open(&path).map_err(|e| VaultError::io(&path, e))?;

        file.lock().map_err(|e| VaultError::io(&path, e))?;
        debug!(lock = %path.display(), "Acquired store lock");

        Ok(Self { file, path })
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        // Closing the descriptor releases the lock as well.
        let _ = self.file.unlock();
        debug!(lock = %self.path.display(), "Released store lock");
    }
}
