//! Ways to run a revocation after the caller has moved on.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use tracing::debug;

use super::{ExposureHandle, ExposureSink};
use crate::duration::format_duration;
use crate::error::{Result, VaultError};

/// Arranges for an exposure to be revoked when its TTL runs out, without
/// blocking the caller.
pub trait RevocationScheduler: Send + Sync {
    fn schedule(&self, sink: &ExposureSink, handle: &ExposureHandle) -> Result<()>;
}

/// Detached task on the ambient tokio runtime. Only useful while the process
/// keeps running.
#[derive(Debug, Clone, Default)]
pub struct TokioScheduler;

impl RevocationScheduler for TokioScheduler {
    fn schedule(&self, sink: &ExposureSink, handle: &ExposureHandle) -> Result<()> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(VaultError::Config(
                "revocation needs a running tokio runtime".to_string(),
            ));
        }
        let _detached = sink.schedule_revocation(handle);
        Ok(())
    }
}

/// Background copy of the current executable that sleeps for the TTL and
/// then revokes, so a short-lived CLI process can exit immediately.
///
/// The child runs `<program> <leading args> revoke --generation N --after TTL`
/// and must share the parent's clipboard settings and generation ledger.
#[derive(Debug, Clone)]
pub struct DetachedProcessScheduler {
    program: PathBuf,
    leading_args: Vec<OsString>,
}

impl DetachedProcessScheduler {
    pub fn new(program: impl Into<PathBuf>, leading_args: Vec<OsString>) -> Self {
        Self {
            program: program.into(),
            leading_args,
        }
    }

    /// Scheduler that re-runs the running binary.
    pub fn current_exe(leading_args: Vec<OsString>) -> Result<Self> {
        let program = std::env::current_exe()
            .map_err(|e| VaultError::Config(format!("cannot locate own executable: {e}")))?;
        Ok(Self::new(program, leading_args))
    }

    fn args(&self, handle: &ExposureHandle) -> Vec<OsString> {
        let mut args = self.leading_args.clone();
        args.extend(
            [
                "revoke".to_string(),
                "--generation".to_string(),
                handle.generation.to_string(),
                "--after".to_string(),
                format_duration(handle.ttl),
            ]
            .map(OsString::from),
        );
        args
    }
}

impl RevocationScheduler for DetachedProcessScheduler {
    fn schedule(&self, _sink: &ExposureSink, handle: &ExposureHandle) -> Result<()> {
        let mut command = Command::new(&self.program);
        command
            .args(self.args(handle))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        // Own process group so a Ctrl-C aimed at the shell does not take the
        // pending revocation down with it.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let child = command
            .spawn()
            .map_err(|e| VaultError::Clipboard(format!("failed to schedule clipboard clear: {e}")))?;
        debug!(
            pid = child.id(),
            generation = handle.generation,
            "Spawned clipboard revoker"
        );
        Ok(())
    }
}
