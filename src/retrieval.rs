//! Read-only lookups and clipboard hand-off.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Result, VaultError};
use crate::exposure::{ExposureHandle, ExposureSink, RevocationScheduler};
use crate::store::Vault;

/// Looks credentials up in a [`Vault`] and exposes secrets through an
/// [`ExposureSink`] for a bounded time.
pub struct Retriever {
    vault: Vault,
    sink: ExposureSink,
    scheduler: Arc<dyn RevocationScheduler>,
    ttl: Duration,
}

impl Retriever {
    pub fn new(
        vault: Vault,
        sink: ExposureSink,
        scheduler: Arc<dyn RevocationScheduler>,
        ttl: Duration,
    ) -> Self {
        Self {
            vault,
            sink,
            scheduler,
            ttl,
        }
    }

    pub fn vault(&self) -> &Vault {
        &self.vault
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Copy the first matching credential's secret to the clipboard and
    /// schedule its removal. Returns the username and the exposure.
    pub fn retrieve(&self, service: &str) -> Result<(String, ExposureHandle)> {
        let store = self.vault.read()?;
        let record = store
            .find(service)
            .ok_or_else(|| VaultError::NotFound(service.to_string()))?;

        let handle = self.sink.stage(record.secret(), self.ttl)?;
        if let Err(e) = self.scheduler.schedule(&self.sink, &handle) {
            // Without a pending revocation nothing would ever clear it.
            if let Err(clear_err) = self.sink.revoke_if_current(handle.generation) {
                warn!(error = %clear_err, "Failed to clear clipboard after scheduling failed");
            }
            return Err(e);
        }
        debug!(service = %service, generation = handle.generation, "Exposed credential");

        Ok((record.username().to_string(), handle))
    }

    /// Distinct service names, without exposing anything.
    pub fn list_services(&self) -> Result<Vec<String>> {
        self.vault.list_services()
    }
}
