//! Manual editing through an external text editor.
//!
//! When automatic correction is declined or impossible, the operator fixes the
//! address by hand. [`ManualEditStation`] writes the current text to a
//! temporary `.txt` file, opens it in an editor without waiting for the editor
//! to exit, then polls the file until its content changes. The editor is only
//! a way to get new bytes into that file: no exit status is awaited and there
//! is no timeout.

use crate::config::EditConfig;
use crate::error::EnvelopeError;
use crate::progress::{self, ProgressCallback};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

/// Text handed to the editor. The shape is preserved across an edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditPayload {
    Text(String),
    Lines(Vec<String>),
}

impl EditPayload {
    /// File content for this payload: lines are joined with `\n`.
    pub fn serialize(&self) -> String {
        match self {
            EditPayload::Text(t) => t.clone(),
            EditPayload::Lines(lines) => lines.join("\n"),
        }
    }

    /// A payload of the same shape holding `content`.
    pub fn reshape(&self, content: String) -> EditPayload {
        match self {
            EditPayload::Text(_) => EditPayload::Text(content),
            EditPayload::Lines(_) => {
                EditPayload::Lines(content.lines().map(str::to_string).collect())
            }
        }
    }

    /// The payload as address lines.
    pub fn into_lines(self) -> Vec<String> {
        match self {
            EditPayload::Text(t) => t.lines().map(str::to_string).collect(),
            EditPayload::Lines(lines) => lines,
        }
    }
}

/// Lets the operator rewrite a payload.
pub trait ManualEditor {
    fn edit(&mut self, payload: EditPayload) -> Result<EditPayload, EnvelopeError>;
}

/// Opens a file in an editor without waiting for it to close.
pub trait EditorLauncher {
    fn launch(&self, path: &Path) -> Result<(), EnvelopeError>;
}

/// The host's default editor: Notepad, TextEdit or gedit.
#[derive(Debug, Clone)]
pub struct PlatformLauncher {
    os: String,
}

impl PlatformLauncher {
    pub fn current() -> Self {
        Self::for_os(std::env::consts::OS)
    }

    pub fn for_os(os: impl Into<String>) -> Self {
        Self { os: os.into() }
    }

    /// Program and leading arguments for this OS; the file path follows.
    pub fn command(&self) -> Result<(&'static str, &'static [&'static str]), EnvelopeError> {
        match self.os.as_str() {
            "windows" => Ok(("notepad.exe", &[])),
            "macos" => Ok(("open", &["-a", "TextEdit"])),
            "linux" | "freebsd" | "openbsd" | "netbsd" | "dragonfly" => Ok(("gedit", &[])),
            other => Err(EnvelopeError::UnsupportedPlatform {
                os: other.to_string(),
            }),
        }
    }
}

impl EditorLauncher for PlatformLauncher {
    fn launch(&self, path: &Path) -> Result<(), EnvelopeError> {
        let (program, args) = self.command()?;
        spawn_detached(program, args.iter().copied(), path)
    }
}

/// A user-configured editor command line.
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    program: String,
    args: Vec<String>,
}

impl CommandLauncher {
    /// Split `command` on whitespace. `None` when it is blank.
    pub fn parse(command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }
}

impl EditorLauncher for CommandLauncher {
    fn launch(&self, path: &Path) -> Result<(), EnvelopeError> {
        spawn_detached(&self.program, self.args.iter().map(String::as_str), path)
    }
}

fn spawn_detached<'a>(
    program: &str,
    args: impl Iterator<Item = &'a str>,
    path: &Path,
) -> Result<(), EnvelopeError> {
    debug!("Launching {} on {}", program, path.display());
    Command::new(program)
        .args(args)
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map(drop)
        .map_err(|source| EnvelopeError::EditorLaunch {
            program: program.to_string(),
            source,
        })
}

/// Edits payloads through a temporary file and an external editor.
pub struct ManualEditStation {
    launcher: Box<dyn EditorLauncher>,
    poll_interval: Duration,
    progress: ProgressCallback,
}

impl ManualEditStation {
    pub fn new(launcher: Box<dyn EditorLauncher>, poll_interval: Duration) -> Self {
        Self {
            launcher,
            poll_interval,
            progress: progress::noop(),
        }
    }

    /// The configured editor command if any, the platform editor otherwise.
    pub fn from_config(config: &EditConfig) -> Self {
        let launcher: Box<dyn EditorLauncher> =
            match config.editor.as_deref().and_then(CommandLauncher::parse) {
                Some(cmd) => Box::new(cmd),
                None => Box::new(PlatformLauncher::current()),
            };
        Self::new(launcher, config.poll_interval())
    }

    pub fn progress(mut self, cb: ProgressCallback) -> Self {
        self.progress = cb;
        self
    }

    fn wait_for_change(&self, path: &Path, original: &str) -> String {
        loop {
            // A failed read (editor mid-save) counts as unchanged.
            if let Ok(bytes) = fs::read(path) {
                let current = String::from_utf8_lossy(&bytes);
                if current != original {
                    return current.into_owned();
                }
            }
            thread::sleep(self.poll_interval);
        }
    }
}

impl ManualEditor for ManualEditStation {
    fn edit(&mut self, payload: EditPayload) -> Result<EditPayload, EnvelopeError> {
        let original = payload.serialize();

        let mut file = tempfile::Builder::new()
            .prefix("pdf-envelope-")
            .suffix(".txt")
            .tempfile()
            .map_err(|e| EnvelopeError::Internal(format!("temporary edit file: {}", e)))?;
        file.write_all(original.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|source| EnvelopeError::OutputWriteFailed {
                path: file.path().to_path_buf(),
                source,
            })?;

        self.launcher.launch(file.path())?;
        info!(
            "Please edit the address in the editor window and save it ({})",
            file.path().display()
        );
        self.progress.on_edit_waiting(file.path());

        let edited = self.wait_for_change(file.path(), &original);

        info!("Processed modifications");
        self.progress.on_edit_complete();
        Ok(payload.reshape(edited))
    }
}
