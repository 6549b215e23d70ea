//! Crash-safe file replacement.
//!
//! Content is written to `<path>.inkwell.tmp`, flushed to disk and renamed
//! over the target. A crash at any point leaves either the old file or the
//! new file, never a truncated one. The tmp file is removed when the rename
//! fails.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub(crate) fn tmp_path(path: &Path) -> PathBuf {
    PathBuf::from(format!("{}.inkwell.tmp", path.display()))
}

/// Atomically replace `path` with `contents`, creating parent directories.
pub fn atomic_write(path: &Path, contents: &[u8]) -> io::Result<()> {
    atomic_write_with_tmp(path, contents, &tmp_path(path))
}

fn atomic_write_with_tmp(path: &Path, contents: &[u8], tmp: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    if let Some(tmp_parent) = tmp.parent() {
        fs::create_dir_all(tmp_parent)?;
    }

    let written = fs::File::create(tmp).and_then(|mut f| {
        f.write_all(contents)?;
        f.sync_all()
    });
    if let Err(e) = written {
        let _ = fs::remove_file(tmp);
        return Err(e);
    }

    if let Err(e) = fs::rename(tmp, path) {
        let _ = fs::remove_file(tmp);
        return Err(e);
    }
    tracing::debug!("wrote: {}", path.display());
    Ok(())
}
