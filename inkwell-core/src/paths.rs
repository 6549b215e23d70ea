//! `~/.inkwell/` layout.
//!
//! ```text
//! ~/.inkwell/
//!   config.yaml
//!   state.json            (sync records, atomic tmp + rename)
//!   cache/                (artifacts keyed by notebook + version)
//!   work/                 (per-run scratch space for fetched documents)
//!   logs/sync.log
//! ```

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

pub const CONFIG_FILE: &str = "config.yaml";
pub const STATE_FILE: &str = "state.json";
pub const SYNC_LOG: &str = "sync.log";

pub fn inkwell_root(home: &Path) -> PathBuf {
    home.join(".inkwell")
}

pub fn config_path(home: &Path) -> PathBuf {
    inkwell_root(home).join(CONFIG_FILE)
}

pub fn state_path(home: &Path) -> PathBuf {
    inkwell_root(home).join(STATE_FILE)
}

pub fn cache_dir(home: &Path) -> PathBuf {
    inkwell_root(home).join("cache")
}

pub fn work_dir(home: &Path) -> PathBuf {
    inkwell_root(home).join("work")
}

pub fn logs_dir(home: &Path) -> PathBuf {
    inkwell_root(home).join("logs")
}

pub fn sync_log_path(home: &Path) -> PathBuf {
    logs_dir(home).join(SYNC_LOG)
}

/// Expand a leading `~` against `home`. Other paths are returned unchanged.
pub fn expand_home(path: &Path, home: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => home.join(rest),
        Err(_) => path.to_path_buf(),
    }
}

/// The current user's home directory.
pub fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_rooted_under_dot_inkwell() {
        let home = Path::new("/home/u");
        assert_eq!(state_path(home), PathBuf::from("/home/u/.inkwell/state.json"));
        assert_eq!(
            sync_log_path(home),
            PathBuf::from("/home/u/.inkwell/logs/sync.log")
        );
    }

    #[test]
    fn tilde_expands_against_home() {
        let home = Path::new("/home/u");
        assert_eq!(
            expand_home(Path::new("~/Vault"), home),
            PathBuf::from("/home/u/Vault")
        );
        assert_eq!(expand_home(Path::new("/abs"), home), PathBuf::from("/abs"));
    }
}
