//! Crypto backend configuration.
//!
//! Lives under `[crypto]` in `lockbox.toml`:
//!
//! ```toml
//! [crypto]
//! backend = "gpg"
//! recipient = "me@example.com"
//! ```
//!
//! or
//!
//! ```toml
//! [crypto]
//! backend = "age"
//! identity_file = "identity.txt"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{AgeGateway, CryptoGateway, GpgGateway};

fn default_gpg_program() -> String {
    "gpg".to_string()
}

fn default_gpgconf_program() -> String {
    "gpgconf".to_string()
}

/// Which crypto backend protects the store, and how to reach its key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum CryptoConfig {
    Gpg {
        /// Key id, fingerprint or email narrowing the secret-key search.
        #[serde(default)]
        recipient: Option<String>,

        #[serde(default = "default_gpg_program")]
        program: String,

        #[serde(default = "default_gpgconf_program")]
        gpgconf_program: String,
    },
    Age {
        /// Identity file. Defaults to `identity.txt` beside the config file.
        #[serde(default)]
        identity_file: Option<PathBuf>,
    },
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self::Gpg {
            recipient: None,
            program: default_gpg_program(),
            gpgconf_program: default_gpgconf_program(),
        }
    }
}

impl CryptoConfig {
    /// Backend name as written in `backend = "..."`.
    pub fn backend_name(&self) -> &'static str {
        match self {
            CryptoConfig::Gpg { .. } => "gpg",
            CryptoConfig::Age { .. } => "age",
        }
    }

    /// File extension conventionally used for a store of this backend.
    pub fn store_extension(&self) -> &'static str {
        match self {
            CryptoConfig::Gpg { .. } => "gpg",
            CryptoConfig::Age { .. } => "age",
        }
    }

    /// Build the gateway. Relative paths resolve against `config_dir`.
    pub fn build(&self, config_dir: &Path) -> Box<dyn CryptoGateway> {
        match self {
            CryptoConfig::Gpg {
                recipient,
                program,
                gpgconf_program,
            } => Box::new(GpgGateway::new(
                program.clone(),
                gpgconf_program.clone(),
                recipient.clone(),
            )),
            CryptoConfig::Age { identity_file } => {
                Box::new(AgeGateway::new(resolve_identity_file(
                    identity_file.as_deref(),
                    config_dir,
                )))
            }
        }
    }
}

fn resolve_identity_file(identity_file: Option<&Path>, config_dir: &Path) -> PathBuf {
    match identity_file {
        Some(p) if p.is_absolute() => p.to_path_buf(),
        Some(p) => config_dir.join(p),
        None => config_dir.join("identity.txt"),
    }
}
