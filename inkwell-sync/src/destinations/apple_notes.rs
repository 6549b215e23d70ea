//! Apple Notes, driven through AppleScript.
//!
//! Every publish renders a script that ensures the root and sub-folder
//! exist, deletes any note with the same title in the target folder and
//! creates the note with its page images attached. Notes is a single
//! desktop application, so publishes are never run concurrently.

use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use inkwell_core::config::AppleNotesSettings;
use inkwell_core::types::DestinationName;
use inkwell_render::{NoteContext, NoteFormat, Renderer};

use crate::dispatch::{Destination, PublishUnit};
use crate::error::DestinationError;

/// Attempts per publish when the script itself fails. Notes occasionally
/// rejects scripting while it is still launching.
const SCRIPT_ATTEMPTS: u32 = 3;
const SCRIPT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Executes an AppleScript program.
pub trait ScriptRunner: Send + Sync {
    fn run(&self, script: &str, timeout: Duration) -> Result<(), DestinationError>;
}

/// Runs scripts with `osascript`, reading the program from stdin.
#[derive(Debug, Clone, Copy, Default)]
pub struct Osascript;

impl ScriptRunner for Osascript {
    fn run(&self, script: &str, timeout: Duration) -> Result<(), DestinationError> {
        run_piped(Command::new("osascript").arg("-"), script, timeout)
    }
}

/// Feed `script` to `command` on stdin and wait up to `timeout`.
///
/// stderr is drained on its own thread so a chatty child never blocks on a
/// full pipe.
fn run_piped(
    command: &mut Command,
    script: &str,
    timeout: Duration,
) -> Result<(), DestinationError> {
    let spawn_err = |e: std::io::Error| DestinationError::Script {
        status: "spawn failed".to_string(),
        stderr: e.to_string(),
    };
    let mut child = command
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(spawn_err)?;

    let stderr_pipe = child.stderr.take();
    let stderr_reader = std::thread::spawn(move || {
        let mut buf = String::new();
        if let Some(mut pipe) = stderr_pipe {
            let _ = pipe.read_to_string(&mut buf);
        }
        buf
    });

    if let Some(mut stdin) = child.stdin.take() {
        if let Err(e) = stdin.write_all(script.as_bytes()) {
            let _ = child.kill();
            let _ = child.wait();
            return Err(spawn_err(e));
        }
    }

    let started = Instant::now();
    let status = loop {
        match child.try_wait().map_err(spawn_err)? {
            Some(status) => break status,
            None if started.elapsed() >= timeout => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(DestinationError::Timeout {
                    secs: timeout.as_secs(),
                });
            }
            None => std::thread::sleep(Duration::from_millis(50)),
        }
    };

    let stderr = stderr_reader.join().unwrap_or_default();
    if status.success() {
        return Ok(());
    }
    Err(DestinationError::Script {
        status: status.to_string(),
        stderr: stderr.trim().to_string(),
    })
}

pub struct AppleNotesDestination {
    folder_name: String,
    timeout: Duration,
    retry_delay: Duration,
    renderer: Arc<Renderer>,
    runner: Box<dyn ScriptRunner>,
}

impl AppleNotesDestination {
    pub fn new(settings: &AppleNotesSettings, renderer: Arc<Renderer>) -> Self {
        Self::with_runner(settings, renderer, Box::new(Osascript))
    }

    pub fn with_runner(
        settings: &AppleNotesSettings,
        renderer: Arc<Renderer>,
        runner: Box<dyn ScriptRunner>,
    ) -> Self {
        AppleNotesDestination {
            folder_name: settings.folder_name.clone(),
            timeout: Duration::from_secs(settings.script_timeout_secs),
            retry_delay: SCRIPT_RETRY_DELAY,
            renderer,
            runner,
        }
    }

    /// Override the pause between script attempts.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn script_for(&self, unit: &PublishUnit) -> Result<String, DestinationError> {
        let attachments = unit
            .attachments
            .iter()
            .filter(|p| p.exists())
            .map(|p| {
                std::fs::canonicalize(p)
                    .unwrap_or_else(|_| p.clone())
                    .display()
                    .to_string()
            })
            .collect();
        let ctx = NoteContext::new(&unit.title, &unit.text)
            .with_source_path(unit.source_path())
            .with_folders(self.folder_name.clone(), unit.sub_folder.clone())
            .with_attachments(attachments);
        Ok(self.renderer.render(&ctx, NoteFormat::AppleNotesScript)?)
    }
}

impl Destination for AppleNotesDestination {
    fn name(&self) -> DestinationName {
        DestinationName::apple_notes()
    }

    fn concurrency_safe(&self) -> bool {
        false
    }

    fn publish(&self, unit: &PublishUnit) -> Result<(), DestinationError> {
        let script = self.script_for(unit)?;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.runner.run(&script, self.timeout) {
                Ok(()) => return Ok(()),
                Err(e) if attempt < SCRIPT_ATTEMPTS => {
                    tracing::warn!(
                        "AppleScript error (attempt {attempt}/{SCRIPT_ATTEMPTS}) for {}: {e}",
                        unit.title
                    );
                    std::thread::sleep(self.retry_delay);
                }
                Err(e) => return Err(e),
            }
        }
    }
}
