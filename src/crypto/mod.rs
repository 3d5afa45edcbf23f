//! Crypto gateway: the only code that turns plaintext into the store's
//! ciphertext and back.
//!
//! Two backends are provided:
//!
//! - [`GpgGateway`] drives an installed `gpg`, so the secret key and its
//!   passphrase stay under `gpg-agent`'s control.
//! - [`AgeGateway`] uses an X25519 identity file through the `age` crate.
//!
//! Both resolve exactly one recipient identity. Zero identities is
//! [`VaultError::KeyNotConfigured`]; more than one is a hard
//! [`VaultError::Encryption`] rather than a silent pick.
//!
//! [`VaultError::KeyNotConfigured`]: crate::error::VaultError::KeyNotConfigured
//! [`VaultError::Encryption`]: crate::error::VaultError::Encryption

mod age_file;
mod config;
mod gpg;

pub use age_file::AgeGateway;
pub use config::CryptoConfig;
pub use gpg::GpgGateway;

use zeroize::Zeroizing;

use crate::error::Result;

/// Encrypts to and decrypts from the store's single recipient identity.
pub trait CryptoGateway: Send + Sync {
    /// Encrypt `plaintext` to the resolved recipient.
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Decrypt a blob previously produced by [`CryptoGateway::encrypt`].
    fn decrypt(&self, blob: &[u8]) -> Result<Zeroizing<Vec<u8>>>;

    /// Drop any cached unlocked key state so the next operation
    /// re-authenticates.
    ///
    /// Called before every sensitive operation. An error means the cache
    /// could not be dropped, and the operation must not go ahead.
    fn invalidate_cached_credentials(&self) -> Result<()> {
        Ok(())
    }

    /// Verify the external tools or files this backend needs are present.
    fn check_dependencies(&self) -> Result<()>;

    /// Short backend name for display.
    fn name(&self) -> &'static str;
}
