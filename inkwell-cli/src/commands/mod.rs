pub mod cache;
pub mod init;
pub mod status;
pub mod sync;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use inkwell_core::{config, paths, Config};

pub(crate) fn home_dir() -> Result<PathBuf> {
    paths::home().context("could not determine home directory")
}

/// Load `explicit`, or `~/.inkwell/config.yaml` when no path was given.
pub(crate) fn load_config(home: &Path, explicit: Option<&Path>) -> Result<Config> {
    let path = explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config::config_path_at(home));
    config::load_from(&path).with_context(|| format!("failed to load {}", path.display()))
}
