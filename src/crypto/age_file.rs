//! age backend using an X25519 identity file.
//!
//! The identity file has the usual `age-keygen` layout: `#` comments and one
//! `AGE-SECRET-KEY-1...` line per identity. It is read fresh for every
//! operation, so there is no unlocked key material cached between calls.

use std::path::{Path, PathBuf};

use age::x25519;
use tracing::debug;
use zeroize::Zeroizing;

use super::CryptoGateway;
use crate::error::{Result, VaultError};

/// Crypto gateway backed by an age identity file.
#[derive(Debug, Clone)]
pub struct AgeGateway {
    identity_file: PathBuf,
}

impl AgeGateway {
    pub fn new(identity_file: impl AsRef<Path>) -> Self {
        Self {
            identity_file: identity_file.as_ref().to_path_buf(),
        }
    }

    pub fn identity_file(&self) -> &Path {
        &self.identity_file
    }

    fn load_identities(&self) -> Result<Vec<x25519::Identity>> {
        let content = match std::fs::read_to_string(&self.identity_file) {
            Ok(content) => Zeroizing::new(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(VaultError::KeyNotConfigured(format!(
                    "identity file {} does not exist",
                    self.identity_file.display()
                )));
            }
            Err(e) => return Err(VaultError::io(&self.identity_file, e)),
        };

        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .enumerate()
            .map(|(idx, line)| {
                line.parse::<x25519::Identity>().map_err(|_| {
                    VaultError::KeyNotConfigured(format!(
                        "identity {} in {} is not an X25519 age key",
                        idx + 1,
                        self.identity_file.display()
                    ))
                })
            })
            .collect()
    }
}

impl CryptoGateway for AgeGateway {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let identities = self.load_identities()?;
        let identity = match identities.as_slice() {
            [] => {
                return Err(VaultError::KeyNotConfigured(format!(
                    "no identities in {}",
                    self.identity_file.display()
                )))
            }
            [single] => single,
            many => {
                return Err(VaultError::Encryption(format!(
                    "ambiguous recipient: {} identities in {}",
                    many.len(),
                    self.identity_file.display()
                )))
            }
        };

        let recipient = identity.to_public();
        debug!(recipient = %recipient, "Encrypting store");
        age::encrypt(&recipient, plaintext).map_err(|e| VaultError::Encryption(e.to_string()))
    }

    fn decrypt(&self, blob: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        let identities = self.load_identities()?;
        if identities.is_empty() {
            return Err(VaultError::KeyNotConfigured(format!(
                "no identities in {}",
                self.identity_file.display()
            )));
        }

        let mut last_error = None;
        for identity in &identities {
            match age::decrypt(identity, blob) {
                Ok(plaintext) => return Ok(Zeroizing::new(plaintext)),
                Err(e) => last_error = Some(e),
            }
        }

        Err(VaultError::Decryption(
            last_error.map(|e| e.to_string()).unwrap_or_default(),
        ))
    }

    fn check_dependencies(&self) -> Result<()> {
        if self.identity_file.is_file() {
            Ok(())
        } else {
            Err(VaultError::DependencyMissing(format!(
                "age identity file {} not found",
                self.identity_file.display()
            )))
        }
    }

    fn name(&self) -> &'static str {
        "age"
    }
}
