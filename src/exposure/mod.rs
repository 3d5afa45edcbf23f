//! Time-bounded exposure of a secret on the clipboard.
//!
//! [`ExposureSink::stage`] puts a secret on the clipboard under a fresh
//! generation. A revocation scheduled for that generation clears the
//! clipboard once the TTL has elapsed, unless a newer exposure has replaced
//! it in the meantime.

mod clipboard;
mod ledger;
mod scheduler;

pub use clipboard::{Clipboard, CommandClipboard, MemoryClipboard};
pub use ledger::{FileLedger, GenerationLedger, MemoryLedger};
pub use scheduler::{DetachedProcessScheduler, RevocationScheduler, TokioScheduler};

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::Result;

/// Default time a secret stays on the clipboard.
pub const DEFAULT_TTL: Duration = Duration::from_secs(45);

/// A secret currently on the clipboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExposureHandle {
    pub generation: u64,
    pub ttl: Duration,
    pub exposed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Clipboard plus the generation ledger that orders exposures.
#[derive(Clone)]
pub struct ExposureSink {
    clipboard: Arc<dyn Clipboard>,
    ledger: Arc<dyn GenerationLedger>,
    clock: Arc<dyn Clock>,
}

impl ExposureSink {
    pub fn new(clipboard: Arc<dyn Clipboard>, ledger: Arc<dyn GenerationLedger>) -> Self {
        Self::with_clock(clipboard, ledger, Arc::new(SystemClock))
    }

    pub fn with_clock(
        clipboard: Arc<dyn Clipboard>,
        ledger: Arc<dyn GenerationLedger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            clipboard,
            ledger,
            clock,
        }
    }

    /// Put `secret` on the clipboard as the newest exposure.
    ///
    /// If the clipboard rejects the value it is cleared on a best-effort
    /// basis, since the previous exposure's timer no longer owns it.
    pub fn stage(&self, secret: &SecretString, ttl: Duration) -> Result<ExposureHandle> {
        let generation = self.ledger.advance(&mut |_| {
            self.clipboard
                .set(secret.expose_secret().as_bytes())
                .inspect_err(|_| {
                    if let Err(e) = self.clipboard.clear() {
                        warn!(error = %e, "Failed to clear clipboard after a failed copy");
                    }
                })
        })?;

        let exposed_at = self.clock.now();
        debug!(generation, ttl_secs = ttl.as_secs(), "Secret staged on clipboard");
        Ok(ExposureHandle {
            generation,
            ttl,
            exposed_at,
            expires_at: self.clock.after(ttl),
        })
    }

    /// Clear the clipboard if `generation` is still the newest exposure.
    ///
    /// Returns `false` when a newer exposure has superseded it.
    pub fn revoke_if_current(&self, generation: u64) -> Result<bool> {
        let cleared = self
            .ledger
            .revoke_if_current(generation, &mut || self.clipboard.clear())?;
        if cleared {
            info!(generation, "Cleared clipboard");
        } else {
            debug!(generation, "Exposure superseded; clipboard left alone");
        }
        Ok(cleared)
    }

    /// Spawn a task on the current tokio runtime that revokes `handle` once
    /// its TTL has elapsed.
    ///
    /// The task is detached: dropping the returned handle does not cancel it.
    pub fn schedule_revocation(&self, handle: &ExposureHandle) -> JoinHandle<()> {
        let sink = self.clone();
        let generation = handle.generation;
        let ttl = handle.ttl;

        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Err(e) = sink.revoke_if_current(generation) {
                warn!(generation, error = %e, "Failed to revoke clipboard exposure");
            }
        })
    }
}

impl std::fmt::Debug for ExposureSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExposureSink").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::clock::FixedClock;
    use crate::error::VaultError;

    fn sink(clipboard: Arc<dyn Clipboard>) -> ExposureSink {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap());
        ExposureSink::with_clock(clipboard, Arc::new(MemoryLedger::new()), Arc::new(clock))
    }

    fn secret(value: &str) -> SecretString {
        SecretString::from(value.to_string())
    }

    #[test]
    fn test_stage_sets_clipboard_and_handle() {
        let clipboard = Arc::new(MemoryClipboard::new());
        let sink = sink(clipboard.clone());

        let handle = sink.stage(&secret("p1"), DEFAULT_TTL).unwrap();
        assert_eq!(clipboard.contents(), b"p1");
        assert_eq!(handle.generation, 1);
        assert_eq!(handle.ttl, Duration::from_secs(45));
        assert_eq!(
            handle.expires_at,
            Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 45).unwrap()
        );
    }

    #[test]
    fn test_stale_revocation_skipped() {
        let clipboard = Arc::new(MemoryClipboard::new());
        let sink = sink(clipboard.clone());

        let first = sink.stage(&secret("p1"), DEFAULT_TTL).unwrap();
        let second = sink.stage(&secret("p2"), DEFAULT_TTL).unwrap();

        assert!(!sink.revoke_if_current(first.generation).unwrap());
        assert_eq!(clipboard.contents(), b"p2");

        assert!(sink.revoke_if_current(second.generation).unwrap());
        assert!(clipboard.contents().is_empty());
    }

    struct RejectingClipboard {
        inner: MemoryClipboard,
    }

    impl Clipboard for RejectingClipboard {
        fn set(&self, value: &[u8]) -> Result<()> {
            if value.is_empty() {
                self.inner.set(value)
            } else {
                Err(VaultError::Clipboard("rejected".to_string()))
            }
        }
    }

    #[test]
    fn test_failed_copy_clears_previous_secret() {
        let clipboard = Arc::new(RejectingClipboard {
            inner: MemoryClipboard::new(),
        });
        clipboard.inner.set(b"older secret").unwrap();
        let sink = sink(clipboard.clone());

        let err = sink.stage(&secret("p1"), DEFAULT_TTL).unwrap_err();
        assert!(matches!(err, VaultError::Clipboard(_)));
        assert!(clipboard.inner.contents().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_revocation_clears_after_ttl() {
        let clipboard = Arc::new(MemoryClipboard::new());
        let sink = sink(clipboard.clone());

        let handle = sink.stage(&secret("p1"), Duration::from_secs(45)).unwrap();
        let task = sink.schedule_revocation(&handle);

        tokio::time::sleep(Duration::from_secs(44)).await;
        assert_eq!(clipboard.contents(), b"p1");

        task.await.unwrap();
        assert!(clipboard.contents().is_empty());
    }
}
