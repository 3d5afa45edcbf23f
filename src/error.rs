//! Error types shared by every part of the store.
//!
//! Messages name services, paths and tool output. They never carry secret
//! material, so every variant is safe to print to stderr or a log.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VaultError {
    /// A required external capability (gpg, clipboard program, identity file)
    /// is absent.
    #[error("Missing dependency: {0}")]
    DependencyMissing(String),

    #[error("No usable encryption identity: {0}")]
    KeyNotConfigured(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Store is corrupt at line {line}: {reason}")]
    CorruptStore { line: usize, reason: String },

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("No credential stored for service '{0}'")]
    NotFound(String),

    #[error("Store file not found: {}", .0.display())]
    StoreNotFound(PathBuf),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Clipboard error: {0}")]
    Clipboard(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl VaultError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, VaultError>;
