//! The encrypted store file and the transactions over it.
//!
//! Every change runs as one transaction:
//!
//! 1. take the exclusive store lock
//! 2. drop any cached unlocked key state in the crypto gateway
//! 3. decrypt and decode the current file, or start empty if there is none
//! 4. apply the mutation in memory
//! 5. encode and encrypt the result
//! 6. atomically rename the new ciphertext over the old file
//!
//! Plaintext only ever exists in zeroizing memory buffers, so there is no
//! plaintext scratch file to clean up. A failure at any step before the
//! rename leaves the previous file as the authoritative copy.

mod atomic;
mod lock;

pub use atomic::replace_file;
pub use lock::StoreLock;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::codec::{self, CredentialRecord, CredentialStore};
use crate::crypto::CryptoGateway;
use crate::error::{Result, VaultError};

/// Handle to one encrypted store file.
///
/// This is the only type that reads or writes the file.
#[derive(Clone)]
pub struct Vault {
    path: PathBuf,
    gateway: Arc<dyn CryptoGateway>,
}

impl Vault {
    pub fn new(path: impl AsRef<Path>, gateway: Arc<dyn CryptoGateway>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            gateway,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn gateway(&self) -> &dyn CryptoGateway {
        self.gateway.as_ref()
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Run a read-modify-write transaction.
    ///
    /// `mutator` edits the decrypted store in place. If it returns an error
    /// nothing is written. A mutator that changes nothing still re-encrypts
    /// and replaces the file, and succeeds.
    pub fn apply<T, F>(&self, mutator: F) -> Result<T>
    where
        F: FnOnce(&mut CredentialStore) -> Result<T>,
    {
        atomic::ensure_parent_dir(&self.path)?;
        let _lock = StoreLock::acquire(&self.path)?;
        self.gateway.invalidate_cached_credentials()?;

        let mut store = self.load_locked()?.unwrap_or_default();
        let before = store.len();
        let outcome = mutator(&mut store)?;

        let plaintext = codec::serialize(&store);
        let blob = self.gateway.encrypt(&plaintext)?;
        drop(plaintext);

        atomic::replace_file(&self.path, &blob)?;
        info!(
            store = %self.path.display(),
            records_before = before,
            records_after = store.len(),
            "Committed store transaction"
        );

        Ok(outcome)
    }

    /// Append a credential. Duplicate services are kept.
    pub fn add(&self, record: CredentialRecord) -> Result<()> {
        let service = record.service().to_string();
        self.apply(move |store| {
            store.push(record);
            Ok(())
        })?;
        debug!(service = %service, "Added credential");
        Ok(())
    }

    /// Remove every credential for `service`, returning how many went.
    ///
    /// Removing a service that is not stored is not an error. Without a
    /// store file there is nothing to remove, and no file is created.
    pub fn delete(&self, service: &str) -> Result<usize> {
        if !self.exists() {
            debug!(service = %service, "No store file; nothing to delete");
            return Ok(0);
        }

        let removed = self.apply(|store| Ok(store.remove_service(service)))?;
        debug!(service = %service, removed, "Deleted credentials");
        Ok(removed)
    }

    /// Decrypt the current store without changing it.
    pub fn read(&self) -> Result<CredentialStore> {
        if !self.exists() {
            return Err(VaultError::StoreNotFound(self.path.clone()));
        }

        let _lock = StoreLock::acquire(&self.path)?;
        self.gateway.invalidate_cached_credentials()?;
        self.load_locked()?
            .ok_or_else(|| VaultError::StoreNotFound(self.path.clone()))
    }

    /// Distinct service names in stored order. A store that does not exist
    /// yet lists nothing.
    pub fn list_services(&self) -> Result<Vec<String>> {
        match self.read() {
            Ok(store) => Ok(store.services()),
            Err(VaultError::StoreNotFound(_)) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// Load the store while the caller holds the lock. `None` if absent.
    fn load_locked(&self) -> Result<Option<CredentialStore>> {
        let blob = match std::fs::read(&self.path) {
            Ok(blob) => blob,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(store = %self.path.display(), "No store file yet");
                return Ok(None);
            }
            Err(e) => return Err(VaultError::io(&self.path, e)),
        };

        let plaintext = self.gateway.decrypt(&blob)?;
        let store = codec::deserialize(&plaintext)?;
        debug!(records = store.len(), "Decrypted store");
        Ok(Some(store))
    }
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("path", &self.path)
            .field("backend", &self.gateway.name())
            .finish()
    }
}
