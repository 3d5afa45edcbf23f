//! Crash-safe replacement of the store file.

use std::io::Write;
use std::path::Path;

use tempfile::Builder;

use crate::error::{Result, VaultError};

/// Replace `path` with `contents` so readers see either the old file or the
/// new one, never a mix.
///
/// The bytes go to a temporary file in the same directory, are flushed to
/// disk, and the temporary file is renamed over `path`. If anything fails
/// before the rename the temporary file is removed and `path` is untouched.
pub fn replace_file(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = parent_dir(path);

    // NamedTempFile is created 0600 and unlinked on drop, which covers every
    // early return below.
    let mut tmp = Builder::new()
        .prefix(".lockbox-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| VaultError::io(dir, e))?;

    tmp.write_all(contents)
        .map_err(|e| VaultError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| VaultError::io(tmp.path(), e))?;

    tmp.persist(path)
        .map_err(|e| VaultError::io(path, e.error))?;

    sync_dir(dir);
    Ok(())
}

/// Create the directory that will hold the store, owner-only on unix.
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    let dir = parent_dir(path);
    if dir.is_dir() {
        return Ok(());
    }

    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(dir).map_err(|e| VaultError::io(dir, e))
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

/// Make the rename itself durable. Best effort: not every platform lets a
/// directory be opened and synced.
#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Err(e) = std::fs::File::open(dir).and_then(|d| d.sync_all()) {
        tracing::warn!(dir = %dir.display(), error = %e, "Failed to sync store directory");
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}
