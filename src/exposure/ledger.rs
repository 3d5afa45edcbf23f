//! Exposure generations.
//!
//! Each time a secret is put on the clipboard the generation advances. A
//! pending revocation remembers the generation it was scheduled for and only
//! clears the clipboard if that generation is still current, so an old timer
//! never wipes a newer secret.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Result, VaultError};

/// Monotonic exposure token shared by stagers and revokers.
///
/// Both callbacks run while the ledger is held, so staging a new exposure and
/// revoking an old one can never interleave.
pub trait GenerationLedger: Send + Sync {
    /// Advance the generation and run `stage` with the new value.
    ///
    /// The advance stands even if `stage` fails.
    fn advance(&self, stage: &mut dyn FnMut(u64) -> Result<()>) -> Result<u64>;

    /// Run `revoke` only if `generation` is still current. Returns whether it
    /// ran.
    fn revoke_if_current(
        &self,
        generation: u64,
        revoke: &mut dyn FnMut() -> Result<()>,
    ) -> Result<bool>;

    fn current(&self) -> Result<u64>;
}

/// Ledger for a single process.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    generation: Mutex<u64>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GenerationLedger for MemoryLedger {
    fn advance(&self, stage: &mut dyn FnMut(u64) -> Result<()>) -> Result<u64> {
        let mut generation = self.generation.lock().expect("ledger lock poisoned");
        *generation += 1;
        stage(*generation)?;
        Ok(*generation)
    }

    fn revoke_if_current(
        &self,
        generation: u64,
        revoke: &mut dyn FnMut() -> Result<()>,
    ) -> Result<bool> {
        let current = self.generation.lock().expect("ledger lock poisoned");
        if *current != generation {
            return Ok(false);
        }
        revoke()?;
        Ok(true)
    }

    fn current(&self) -> Result<u64> {
        Ok(*self.generation.lock().expect("ledger lock poisoned"))
    }
}

/// Ledger kept in a small file so separate invocations agree on ordering.
///
/// The file holds the generation as decimal text and is locked exclusively
/// for the duration of each call.
#[derive(Debug, Clone)]
pub struct FileLedger {
    path: PathBuf,
}

impl FileLedger {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// `$XDG_RUNTIME_DIR/lockbox/exposure.gen`, falling back to the cache
    /// directory where there is no runtime directory.
    pub fn default_path() -> Result<PathBuf> {
        dirs::runtime_dir()
            .or_else(dirs::cache_dir)
            .map(|dir| dir.join("lockbox").join("exposure.gen"))
            .ok_or_else(|| {
                VaultError::Config("no runtime or cache directory for exposure state".to_string())
            })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_locked(&self) -> Result<File> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| VaultError::io(parent, e))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|e| VaultError::io(&self.path, e))?;
        file.lock().map_err(|e| VaultError::io(&self.path, e))?;
        Ok(file)
    }

    fn read_generation(&self, file: &mut File) -> Result<u64> {
        let mut content = String::new();
        file.read_to_string(&mut content)
            .map_err(|e| VaultError::io(&self.path, e))?;
        // An empty or garbled file restarts the count; any outstanding timer
        // then sees a mismatch and leaves the clipboard alone.
        Ok(content.trim().parse().unwrap_or(0))
    }

    fn write_generation(&self, file: &mut File, generation: u64) -> Result<()> {
        let io = |e| VaultError::io(&self.path, e);
        file.seek(SeekFrom::Start(0)).map_err(io)?;
        file.set_len(0).map_err(io)?;
        file.write_all(generation.to_string().as_bytes()).map_err(io)?;
        file.sync_data().map_err(io)
    }
}

impl GenerationLedger for FileLedger {
    fn advance(&self, stage: &mut dyn FnMut(u64) -> Result<()>) -> Result<u64> {
        let mut file = self.open_locked()?;
        let generation = self.read_generation(&mut file)?.wrapping_add(1).max(1);
        self.write_generation(&mut file, generation)?;
        stage(generation)?;
        Ok(generation)
    }

    fn revoke_if_current(
        &self,
        generation: u64,
        revoke: &mut dyn FnMut() -> Result<()>,
    ) -> Result<bool> {
        let mut file = self.open_locked()?;
        if self.read_generation(&mut file)? != generation {
            return Ok(false);
        }
        revoke()?;
        Ok(true)
    }

    fn current(&self) -> Result<u64> {
        let mut file = self.open_locked()?;
        self.read_generation(&mut file)
    }
}
