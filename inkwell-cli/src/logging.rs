//! Logging setup and size-based rotation of `~/.inkwell/logs/sync.log`.
//!
//! Records from the engine crates go through the `log` facade and are
//! bridged into the subscriber installed here.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Rotate once the live log reaches this size (10 MiB).
pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

/// Rotated copies kept next to the live log.
pub const MAX_ROTATED_FILES: usize = 5;

/// Install the global subscriber: stderr always, plus `log_file` when given.
///
/// `RUST_LOG` wins over `verbose`. Calling this twice is harmless.
pub fn init_tracing(verbose: bool, log_file: Option<&Path>) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let file_layer = log_file.and_then(open_log).map(|file| {
        fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_writer(Mutex::new(file))
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .with(file_layer)
        .try_init();
}

fn open_log(path: &Path) -> Option<fs::File> {
    if let Some(dir) = path.parent() {
        if let Err(e) = fs::create_dir_all(dir) {
            eprintln!("warning: cannot create log directory {}: {e}", dir.display());
            return None;
        }
    }
    match fs::OpenOptions::new().create(true).append(true).open(path) {
        Ok(f) => Some(f),
        Err(e) => {
            eprintln!("warning: cannot open log file {}: {e}", path.display());
            None
        }
    }
}

/// Rotate `log_path` when it is at least `max_bytes` long:
/// `sync.log` becomes `sync.log.1`, `.1` becomes `.2` and so on, and the
/// copy numbered `max_files` is dropped. Returns whether rotation happened.
pub fn rotate_if_needed(log_path: &Path, max_bytes: u64, max_files: usize) -> io::Result<bool> {
    let size = match fs::metadata(log_path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    if size < max_bytes || max_files == 0 {
        return Ok(false);
    }

    let oldest = rotated_path(log_path, max_files);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for n in (1..max_files).rev() {
        let from = rotated_path(log_path, n);
        if from.exists() {
            fs::rename(&from, rotated_path(log_path, n + 1))?;
        }
    }
    fs::rename(log_path, rotated_path(log_path, 1))?;
    Ok(true)
}

/// Rotate the sync log with the default limits, warning on failure.
pub fn rotate_sync_log(log_path: &Path) {
    match rotate_if_needed(log_path, MAX_LOG_BYTES, MAX_ROTATED_FILES) {
        Ok(true) => eprintln!("rotated {}", log_path.display()),
        Ok(false) => {}
        Err(e) => eprintln!("warning: log rotation failed for {}: {e}", log_path.display()),
    }
}

fn rotated_path(base: &Path, n: usize) -> PathBuf {
    let name = base
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("sync.log");
    base.with_file_name(format!("{name}.{n}"))
}
