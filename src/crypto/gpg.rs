//! GnuPG backend.
//!
//! Runs `gpg` as a child process. Plaintext and ciphertext travel over
//! stdin/stdout only; nothing is written to disk by this module.

use std::io::{self, Write};
use std::process::{Command, Output, Stdio};

use tracing::{debug, warn};
use zeroize::Zeroizing;

use super::CryptoGateway;
use crate::error::{Result, VaultError};

/// Crypto gateway backed by an installed `gpg` and its agent.
#[derive(Debug, Clone)]
pub struct GpgGateway {
    program: String,
    gpgconf_program: String,
    recipient: Option<String>,
}

impl GpgGateway {
    /// Create a gateway using `program` for crypto and `gpgconf_program` to
    /// reset the agent.
    ///
    /// `recipient` narrows the secret-key search (a key id, fingerprint or
    /// email). Without it every secret key in the keyring is a candidate.
    pub fn new(
        program: impl Into<String>,
        gpgconf_program: impl Into<String>,
        recipient: Option<String>,
    ) -> Self {
        Self {
            program: program.into(),
            gpgconf_program: gpgconf_program.into(),
            recipient,
        }
    }

    /// Run a command, feeding `input` on stdin while draining its output.
    fn run(&self, program: &str, args: &[&str], input: &[u8]) -> io::Result<Output> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdin = child.stdin.take();
        std::thread::scope(|scope| {
            let writer = scope.spawn(move || -> io::Result<()> {
                if let Some(mut stdin) = stdin {
                    stdin.write_all(input)?;
                }
                Ok(())
            });
            let output = child.wait_with_output();
            // A broken pipe here means gpg exited early; its status says why.
            match writer.join() {
                Ok(Err(e)) if e.kind() != io::ErrorKind::BrokenPipe => return Err(e),
                _ => {}
            }
            output
        })
    }

    fn missing(&self, program: &str, e: io::Error) -> VaultError {
        if e.kind() == io::ErrorKind::NotFound {
            VaultError::DependencyMissing(format!("{program} not found in PATH"))
        } else {
            VaultError::DependencyMissing(format!("failed to run {program}: {e}"))
        }
    }

    /// Resolve the fingerprint of the single secret key to encrypt to.
    fn resolve_recipient(&self) -> Result<String> {
        let mut args = vec!["--batch", "--with-colons", "--list-secret-keys"];
        if let Some(recipient) = &self.recipient {
            args.push(recipient.as_str());
        }

        let output = self
            .run(&self.program, &args, &[])
            .map_err(|e| self.missing(&self.program, e))?;

        // gpg exits non-zero when the filter matches nothing.
        if !output.status.success() {
            return Err(VaultError::KeyNotConfigured(match &self.recipient {
                Some(r) => format!("no secret key matches '{r}'"),
                None => "no secret keys in keyring".to_string(),
            }));
        }

        let listing = String::from_utf8_lossy(&output.stdout);
        let fingerprints = primary_fingerprints(&listing);
        match fingerprints.as_slice() {
            [] => Err(VaultError::KeyNotConfigured(
                "no secret keys in keyring".to_string(),
            )),
            [single] => Ok(single.clone()),
            many => Err(VaultError::Encryption(format!(
                "ambiguous recipient: {} secret keys match; set crypto.recipient",
                many.len()
            ))),
        }
    }
}

/// Fingerprints of primary secret keys in `--with-colons` output.
fn primary_fingerprints(listing: &str) -> Vec<String> {
    let mut fingerprints = Vec::new();
    let mut awaiting_fpr = false;

    for line in listing.lines() {
        let mut fields = line.split(':');
        match fields.next() {
            Some("sec") => awaiting_fpr = true,
            Some("fpr") if awaiting_fpr => {
                if let Some(fpr) = fields.nth(8).filter(|f| !f.is_empty()) {
                    fingerprints.push(fpr.to_string());
                }
                awaiting_fpr = false;
            }
            _ => {}
        }
    }

    fingerprints
}

fn stderr_message(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        format!("gpg exited with {}", output.status)
    } else {
        trimmed.to_string()
    }
}

impl CryptoGateway for GpgGateway {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let fingerprint = self.resolve_recipient()?;
        debug!(recipient = %fingerprint, "Encrypting store");

        let output = self
            .run(
                &self.program,
                &[
                    "--batch",
                    "--yes",
                    "--quiet",
                    "--trust-model",
                    "always",
                    "--recipient",
                    fingerprint.as_str(),
                    "--output",
                    "-",
                    "--encrypt",
                ],
                plaintext,
            )
            .map_err(|e| self.missing(&self.program, e))?;

        if !output.status.success() {
            return Err(VaultError::Encryption(stderr_message(&output)));
        }
        if output.stdout.is_empty() {
            return Err(VaultError::Encryption("gpg produced no output".to_string()));
        }
        Ok(output.stdout)
    }

    fn decrypt(&self, blob: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        let output = self
            .run(
                &self.program,
                &["--quiet", "--yes", "--output", "-", "--decrypt"],
                blob,
            )
            .map_err(|e| self.missing(&self.program, e))?;

        if !output.status.success() {
            let message = stderr_message(&output);
            drop(Zeroizing::new(output.stdout));
            return Err(VaultError::Decryption(message));
        }
        Ok(Zeroizing::new(output.stdout))
    }

    fn invalidate_cached_credentials(&self) -> Result<()> {
        let output = self
            .run(&self.gpgconf_program, &["--reload", "gpg-agent"], &[])
            .map_err(|e| self.missing(&self.gpgconf_program, e))?;

        // A surviving agent cache would let the next decrypt skip the prompt.
        if !output.status.success() {
            let message = stderr_message(&output);
            warn!(error = %message, "gpgconf could not reload gpg-agent");
            return Err(VaultError::DependencyMissing(format!(
                "{} --reload gpg-agent failed: {message}",
                self.gpgconf_program
            )));
        }
        debug!("Reloaded gpg-agent");
        Ok(())
    }

    fn check_dependencies(&self) -> Result<()> {
        for program in [&self.program, &self.gpgconf_program] {
            let output = self
                .run(program, &["--version"], &[])
                .map_err(|e| self.missing(program, e))?;
            if !output.status.success() {
                return Err(VaultError::DependencyMissing(format!(
                    "{program} --version failed"
                )));
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "gpg"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONE_KEY: &str = "\
sec:u:255:22:AAAA1111BBBB2222:1700000000:::u:::scESC:::+:::ed25519:::0:
fpr:::::::::0123456789ABCDEF0123456789ABCDEF01234567:
grp:::::::::FFFF:
uid:u::::1700000000::HASH::Test User <test@example.com>::::::::::0:
ssb:u:255:18:CCCC3333DDDD4444:1700000000::::::e:::+:::cv25519::
fpr:::::::::FEDCBA9876543210FEDCBA9876543210FEDCBA98:
";

    #[test]
    fn test_single_primary_fingerprint() {
        assert_eq!(
            primary_fingerprints(ONE_KEY),
            vec!["0123456789ABCDEF0123456789ABCDEF01234567".to_string()]
        );
    }

    #[test]
    fn test_subkey_fingerprints_ignored() {
        let other = ONE_KEY.replace("0123456789ABCDEF", "1111222233334444");
        let listing = format!("{ONE_KEY}{other}");
        assert_eq!(primary_fingerprints(&listing).len(), 2);
    }

    #[test]
    fn test_empty_listing() {
        assert!(primary_fingerprints("").is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_agent_reload_is_an_error() {
        // `false` accepts any arguments and exits 1.
        let gateway = GpgGateway::new("gpg", "false", None);
        assert!(matches!(
            gateway.invalidate_cached_credentials(),
            Err(VaultError::DependencyMissing(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_agent_reload_success() {
        let gateway = GpgGateway::new("gpg", "true", None);
        assert!(gateway.invalidate_cached_credentials().is_ok());
    }

    #[test]
    fn test_missing_program_is_dependency_error() {
        let gateway = GpgGateway::new(
            "lockbox-test-no-such-gpg",
            "lockbox-test-no-such-gpgconf",
            None,
        );
        assert!(matches!(
            gateway.check_dependencies(),
            Err(VaultError::DependencyMissing(_))
        ));
        assert!(matches!(
            gateway.encrypt(b"data"),
            Err(VaultError::DependencyMissing(_))
        ));
    }
}
