//! Clipboard sinks.

use std::io::{self, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Mutex;

use zeroize::Zeroizing;

use crate::error::{Result, VaultError};

/// Somewhere a secret can be placed for a short while.
pub trait Clipboard: Send + Sync {
    /// Replace the clipboard contents with `value`.
    fn set(&self, value: &[u8]) -> Result<()>;

    /// Replace the clipboard contents with nothing.
    fn clear(&self) -> Result<()> {
        self.set(&[])
    }
}

/// Clipboard driven by an external copy program reading stdin
/// (`wl-copy`, `xclip`, `pbcopy`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandClipboard {
    program: String,
    args: Vec<String>,
    /// Arguments that clear the clipboard, for programs that do not treat
    /// empty input as "clear".
    clear_args: Option<Vec<String>>,
}

impl CommandClipboard {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            clear_args: None,
        }
    }

    /// Parse a whitespace-separated command line such as
    /// `"xclip -selection clipboard"`.
    pub fn from_command_line(command: &str) -> Result<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| VaultError::Config("clipboard_command is empty".to_string()))?;
        Ok(Self::new(program, parts.collect()))
    }

    /// Pick a copy program for the current session.
    ///
    /// Wayland is preferred over X11 when both are present. Fails with
    /// [`VaultError::DependencyMissing`] if no suitable program is installed.
    pub fn detect() -> Result<Self> {
        let candidates = Self::candidates(
            std::env::var_os("WAYLAND_DISPLAY").is_some(),
            std::env::var_os("DISPLAY").is_some(),
        );

        candidates
            .into_iter()
            .find(|c| find_in_path(&c.program))
            .ok_or_else(|| {
                VaultError::DependencyMissing(
                    "no clipboard program found (install wl-clipboard, xclip, or xsel, \
                     or set exposure.clipboard_command)"
                        .to_string(),
                )
            })
    }

    fn candidates(wayland: bool, x11: bool) -> Vec<Self> {
        let mut out = Vec::new();
        if cfg!(target_os = "macos") {
            out.push(Self::new("pbcopy", Vec::new()));
        }
        if wayland {
            let mut wl = Self::new("wl-copy", Vec::new());
            wl.clear_args = Some(vec!["--clear".to_string()]);
            out.push(wl);
        }
        if x11 {
            out.push(Self::new(
                "xclip",
                vec!["-selection".to_string(), "clipboard".to_string()],
            ));
            out.push(Self::new(
                "xsel",
                vec!["--clipboard".to_string(), "--input".to_string()],
            ));
        }
        out
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Confirm the program can be found, as a one-time startup check.
    pub fn check_available(&self) -> Result<()> {
        if find_in_path(&self.program) {
            Ok(())
        } else {
            Err(VaultError::DependencyMissing(format!(
                "clipboard program '{}' not found",
                self.program
            )))
        }
    }

    fn run(&self, args: &[String], input: &[u8]) -> Result<()> {
        // X11 copy programs fork to keep owning the selection; the forked
        // process would hold captured pipes open, so output is discarded.
        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(input)
                .map_err(|e| VaultError::Clipboard(format!("{}: {e}", self.program)))?;
        }

        let status = child
            .wait()
            .map_err(|e| VaultError::Clipboard(format!("{}: {e}", self.program)))?;
        if !status.success() {
            return Err(VaultError::Clipboard(format!(
                "{} exited with {status}",
                self.program
            )));
        }
        Ok(())
    }

    fn spawn_error(&self, e: io::Error) -> VaultError {
        if e.kind() == io::ErrorKind::NotFound {
            VaultError::DependencyMissing(format!("clipboard program '{}' not found", self.program))
        } else {
            VaultError::Clipboard(format!("failed to run {}: {e}", self.program))
        }
    }
}

impl Clipboard for CommandClipboard {
    fn set(&self, value: &[u8]) -> Result<()> {
        self.run(&self.args, value)
    }

    fn clear(&self) -> Result<()> {
        match &self.clear_args {
            Some(args) => self.run(args, &[]),
            None => self.run(&self.args, &[]),
        }
    }
}

fn find_in_path(program: &str) -> bool {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file();
    }

    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(program).is_file()))
        .unwrap_or(false)
}

/// In-memory clipboard for testing purposes. Keeps every value it was given.
#[derive(Debug, Default)]
pub struct MemoryClipboard {
    history: Mutex<Vec<Zeroizing<Vec<u8>>>>,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current contents. Empty if never set or cleared.
    pub fn contents(&self) -> Vec<u8> {
        let history = self.history.lock().expect("clipboard lock poisoned");
        history.last().map(|v| v.to_vec()).unwrap_or_default()
    }

    /// Number of times the clipboard was written, clears included.
    pub fn writes(&self) -> usize {
        self.history.lock().expect("clipboard lock poisoned").len()
    }
}

impl Clipboard for MemoryClipboard {
    fn set(&self, value: &[u8]) -> Result<()> {
        let mut history = self.history.lock().expect("clipboard lock poisoned");
        history.push(Zeroizing::new(value.to_vec()));
        Ok(())
    }
}
