pub mod clock;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod duration;
pub mod error;
pub mod exposure;
pub mod retrieval;
pub mod store;

pub use codec::{CredentialRecord, CredentialStore};
pub use error::{Result, VaultError};
pub use exposure::{ExposureHandle, ExposureSink};
pub use retrieval::Retriever;
pub use store::Vault;
