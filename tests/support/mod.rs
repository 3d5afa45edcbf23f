#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use age::secrecy::ExposeSecret as _;
use anyhow::Result;
use lockbox::crypto::{AgeGateway, CryptoGateway};
use lockbox::{CredentialRecord, VaultError};
use secrecy::SecretString;
use zeroize::Zeroizing;

/// Write an age identity file holding `count` freshly generated identities.
pub fn write_identity_file(dir: &Path, count: usize) -> Result<PathBuf> {
    let path = dir.join("identity.txt");
    let mut content = String::from("# lockbox test identities\n");
    for _ in 0..count {
        let identity = age::x25519::Identity::generate();
        content.push_str(identity.to_string().expose_secret());
        content.push('\n');
    }
    std::fs::write(&path, content)?;
    Ok(path)
}

/// Append one more identity to an existing identity file.
pub fn add_identity(path: &Path) -> Result<()> {
    let mut content = std::fs::read_to_string(path)?;
    content.push_str(age::x25519::Identity::generate().to_string().expose_secret());
    content.push('\n');
    std::fs::write(path, content)?;
    Ok(())
}

pub fn record(service: &str, username: &str, secret: &str) -> CredentialRecord {
    CredentialRecord::new(service, username, SecretString::from(secret.to_string()))
        .expect("valid test record")
}

/// Gateway wrapper that counts calls and can be told to fail.
pub struct FaultyGateway {
    inner: Arc<dyn CryptoGateway>,
    pub fail_encrypt: AtomicBool,
    pub fail_decrypt: AtomicBool,
    pub invalidations: AtomicUsize,
    pub decrypts: AtomicUsize,
    pub encrypts: AtomicUsize,
}

impl FaultyGateway {
    pub fn new(inner: Arc<dyn CryptoGateway>) -> Self {
        Self {
            inner,
            fail_encrypt: AtomicBool::new(false),
            fail_decrypt: AtomicBool::new(false),
            invalidations: AtomicUsize::new(0),
            decrypts: AtomicUsize::new(0),
            encrypts: AtomicUsize::new(0),
        }
    }

    pub fn age(identity_file: &Path) -> Arc<Self> {
        Arc::new(Self::new(Arc::new(AgeGateway::new(identity_file))))
    }
}

impl CryptoGateway for FaultyGateway {
    fn encrypt(&self, plaintext: &[u8]) -> lockbox::Result<Vec<u8>> {
        self.encrypts.fetch_add(1, Ordering::SeqCst);
        if self.fail_encrypt.load(Ordering::SeqCst) {
            return Err(VaultError::Encryption("injected failure".to_string()));
        }
        self.inner.encrypt(plaintext)
    }

    fn decrypt(&self, blob: &[u8]) -> lockbox::Result<Zeroizing<Vec<u8>>> {
        self.decrypts.fetch_add(1, Ordering::SeqCst);
        if self.fail_decrypt.load(Ordering::SeqCst) {
            return Err(VaultError::Decryption("injected failure".to_string()));
        }
        self.inner.decrypt(blob)
    }

    fn invalidate_cached_credentials(&self) -> lockbox::Result<()> {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
        self.inner.invalidate_cached_credentials()
    }

    fn check_dependencies(&self) -> lockbox::Result<()> {
        self.inner.check_dependencies()
    }

    fn name(&self) -> &'static str {
        "faulty"
    }
}

/// Names of files in `dir`, sorted.
pub fn dir_entries(dir: &Path) -> Result<Vec<String>> {
    let mut names = std::fs::read_dir(dir)?
        .map(|e| e.map(|e| e.file_name().to_string_lossy().into_owned()))
        .collect::<std::io::Result<Vec<_>>>()?;
    names.sort();
    Ok(names)
}

/// Files a store directory should hold after transactions: `names`, plus the
/// lock file on platforms that lock through one.
pub fn expected_entries(names: &[&str]) -> Vec<String> {
    #[allow(unused_mut)]
    let mut names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
    #[cfg(not(unix))]
    names.push("store.age.lock".to_string());
    names.sort();
    names
}
