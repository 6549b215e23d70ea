//! YAML configuration at `~/.inkwell/config.yaml`.
//!
//! # API pattern
//!
//! Like the rest of the crate, loaders come in two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! Every section and field has a default, so a missing file or a partial
//! file both load. Unknown keys are ignored.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};
use crate::paths;
use crate::types::DestinationName;

/// Placeholder values shipped in sample configs; never valid credentials.
const PLACEHOLDER_MARKERS: &[&str] = &["YOUR-OPENAI-KEY-HERE", "YOUR-VISION-KEY-HERE"];

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Root of the YAML configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub sync: SyncSettings,
    pub retry: RetrySettings,
    pub apple_notes: AppleNotesSettings,
    pub obsidian: ObsidianSettings,
    pub source: SourceSettings,
    pub google_vision: VisionSettings,
    pub openai: OpenAiSettings,
    pub paths: PathOverrides,
}

/// Planner and orchestrator settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Notebooks entering the pipeline per run; `0` means unlimited.
    pub max_notebooks_per_run: usize,
    /// Only consider notebooks under this folder path (`"Work/Projects"`).
    pub root_path_filter: Option<String>,
    /// Items (or folders) whose name starts with this marker are ignored.
    pub trash_marker: String,
    /// Notebooks processed concurrently. `1` is strictly sequential.
    pub workers: usize,
    /// Skip imported PDF / EPUB documents.
    pub skip_non_native: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            max_notebooks_per_run: 1,
            root_path_filter: None,
            trash_marker: "[TRASH]".to_string(),
            workers: 1,
            skip_non_native: true,
        }
    }
}

/// Backoff around fetch / OCR / cleanup calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppleNotesSettings {
    pub enabled: bool,
    /// Top-level Notes folder that receives every mirrored notebook.
    pub folder_name: String,
    pub script_timeout_secs: u64,
}

impl Default for AppleNotesSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            folder_name: "reMarkable".to_string(),
            script_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObsidianSettings {
    pub enabled: bool,
    pub vault_path: Option<PathBuf>,
    pub attachments_folder: String,
}

impl Default for ObsidianSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            vault_path: None,
            attachments_folder: "attachments".to_string(),
        }
    }
}

/// Where the exported library listing and rendered pages live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    pub listing_path: PathBuf,
    pub pages_dir: PathBuf,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            listing_path: PathBuf::from("~/.inkwell/export/listing.json"),
            pages_dir: PathBuf::from("~/.inkwell/export/pages"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionSettings {
    /// Falls back to `$GOOGLE_VISION_API_KEY`.
    pub api_key: Option<String>,
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl Default for VisionSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: "https://vision.googleapis.com/v1/images:annotate".to_string(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiSettings {
    pub enabled: bool,
    /// Falls back to `$OPENAI_API_KEY`.
    pub api_key: Option<String>,
    pub model: String,
    pub endpoint: String,
    pub prompt_path: Option<PathBuf>,
    pub timeout_secs: u64,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            prompt_path: None,
            timeout_secs: 120,
        }
    }
}

/// Optional relocations of the `~/.inkwell/` defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PathOverrides {
    pub state_file: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub work_dir: Option<PathBuf>,
}

/// How strictly [`Config::validate`] checks credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    /// Planning only; external services are never called.
    DryRun,
    /// A real run that will call OCR and cleanup services.
    Full,
}

// ---------------------------------------------------------------------------
// Derived values
// ---------------------------------------------------------------------------

impl Config {
    /// Names of every destination enabled in this configuration.
    pub fn enabled_destinations(&self) -> BTreeSet<DestinationName> {
        let mut names = BTreeSet::new();
        if self.apple_notes.enabled {
            names.insert(DestinationName::apple_notes());
        }
        if self.obsidian.enabled {
            names.insert(DestinationName::obsidian());
        }
        names
    }

    /// Vision API key from config, else `$GOOGLE_VISION_API_KEY`.
    pub fn vision_api_key(&self) -> Option<String> {
        non_empty(self.google_vision.api_key.clone())
            .or_else(|| non_empty(std::env::var("GOOGLE_VISION_API_KEY").ok()))
    }

    /// OpenAI API key from config, else `$OPENAI_API_KEY`.
    pub fn openai_api_key(&self) -> Option<String> {
        non_empty(self.openai.api_key.clone())
            .or_else(|| non_empty(std::env::var("OPENAI_API_KEY").ok()))
    }

    pub fn state_path(&self, home: &Path) -> PathBuf {
        self.paths
            .state_file
            .as_deref()
            .map(|p| paths::expand_home(p, home))
            .unwrap_or_else(|| paths::state_path(home))
    }

    pub fn cache_dir(&self, home: &Path) -> PathBuf {
        self.paths
            .cache_dir
            .as_deref()
            .map(|p| paths::expand_home(p, home))
            .unwrap_or_else(|| paths::cache_dir(home))
    }

    pub fn work_dir(&self, home: &Path) -> PathBuf {
        self.paths
            .work_dir
            .as_deref()
            .map(|p| paths::expand_home(p, home))
            .unwrap_or_else(|| paths::work_dir(home))
    }

    pub fn vault_path(&self, home: &Path) -> Option<PathBuf> {
        self.obsidian
            .vault_path
            .as_deref()
            .map(|p| paths::expand_home(p, home))
    }

    /// Check the configuration for problems that would make a run fail
    /// halfway. Returns every problem found, not just the first.
    pub fn validate(&self, mode: Validation) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if self.enabled_destinations().is_empty() {
            problems.push("no destination enabled (apple_notes / obsidian)".to_string());
        }
        if self.obsidian.enabled && self.obsidian.vault_path.is_none() {
            problems.push("obsidian is enabled but 'obsidian.vault_path' is missing".to_string());
        }
        if self.sync.workers == 0 {
            problems.push("'sync.workers' must be at least 1".to_string());
        }

        if mode == Validation::Full {
            match self.vision_api_key() {
                None => problems.push(
                    "missing Google Vision API key ('google_vision.api_key' or $GOOGLE_VISION_API_KEY)"
                        .to_string(),
                ),
                Some(key) if is_placeholder(&key) => problems.push(
                    "Google Vision API key still has its placeholder value".to_string(),
                ),
                Some(_) => {}
            }
            if self.openai.enabled {
                match self.openai_api_key() {
                    None => problems.push(
                        "missing OpenAI API key ('openai.api_key' or $OPENAI_API_KEY); set 'openai.enabled: false' to publish raw OCR text"
                            .to_string(),
                    ),
                    Some(key) if is_placeholder(&key) => problems
                        .push("OpenAI API key still has its placeholder value".to_string()),
                    Some(_) => {}
                }
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid { problems })
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn is_placeholder(key: &str) -> bool {
    PLACEHOLDER_MARKERS.iter().any(|m| key.contains(m))
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

/// `<home>/.inkwell/config.yaml`: pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    paths::config_path(home)
}

/// Load a config from an explicit file. A missing file yields defaults.
pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Load `<home>/.inkwell/config.yaml`.
pub fn load_at(home: &Path) -> Result<Config, ConfigError> {
    load_from(&config_path_at(home))
}

/// Atomically save `config` to `<home>/.inkwell/config.yaml`.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
/// The file may hold API keys, hence the restrictive mode.
pub fn save_at(home: &Path, config: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path_at(home);
    let dir = paths::inkwell_root(home);
    std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;

    let yaml = serde_yaml::to_string(config)?;
    let tmp = path.with_extension("yaml.tmp");
    std::fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
    set_file_permissions(&tmp)?;
    std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    Ok(path)
}

/// Write a default config unless one already exists. Returns the path and
/// whether a new file was created.
pub fn init_at(home: &Path) -> Result<(PathBuf, bool), ConfigError> {
    let path = config_path_at(home);
    if path.exists() {
        return Ok((path, false));
    }
    let path = save_at(home, &Config::default())?;
    Ok((path, true))
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let home = TempDir::new().unwrap();
        let config = load_at(home.path()).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.sync.max_notebooks_per_run, 1);
        assert_eq!(config.sync.trash_marker, "[TRASH]");
    }

    #[test]
    fn default_enables_apple_notes_only() {
        let names = Config::default().enabled_destinations();
        assert_eq!(names.len(), 1);
        assert!(names.contains(&DestinationName::apple_notes()));
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let home = TempDir::new().unwrap();
        let path = config_path_at(home.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            "sync:\n  max_notebooks_per_run: 5\nobsidian:\n  enabled: true\n  vault_path: ~/Vault\n",
        )
        .unwrap();

        let config = load_at(home.path()).unwrap();
        assert_eq!(config.sync.max_notebooks_per_run, 5);
        assert_eq!(config.sync.workers, 1);
        assert!(config.obsidian.enabled);
        assert_eq!(
            config.vault_path(home.path()),
            Some(home.path().join("Vault"))
        );
        assert_eq!(config.enabled_destinations().len(), 2);
    }

    #[test]
    fn save_then_load_roundtrip_and_tmp_removed() {
        let home = TempDir::new().unwrap();
        let mut config = Config::default();
        config.sync.root_path_filter = Some("Work".to_string());
        let path = save_at(home.path(), &config).unwrap();
        assert!(!path.with_extension("yaml.tmp").exists());
        assert_eq!(load_at(home.path()).unwrap(), config);
    }

    #[test]
    fn dry_run_validation_ignores_credentials() {
        let config = Config::default();
        config.validate(Validation::DryRun).expect("dry-run valid");
    }

    #[test]
    fn validation_collects_every_problem() {
        let mut config = Config::default();
        config.apple_notes.enabled = false;
        config.obsidian.enabled = true;
        config.sync.workers = 0;
        let err = config.validate(Validation::DryRun).unwrap_err();
        match err {
            ConfigError::Invalid { problems } => {
                assert_eq!(problems.len(), 2, "got: {problems:?}");
            }
            other => panic!("expected invalid, got {other:?}"),
        }
    }

    #[test]
    fn placeholder_key_is_rejected() {
        let mut config = Config::default();
        config.google_vision.api_key = Some("YOUR-VISION-KEY-HERE".to_string());
        config.openai.api_key = Some("sk-real".to_string());
        let err = config.validate(Validation::Full).unwrap_err();
        assert!(err.to_string().contains("placeholder"));
    }

    #[test]
    fn path_overrides_expand_home() {
        let mut config = Config::default();
        let home = Path::new("/home/u");
        assert_eq!(config.state_path(home), paths::state_path(home));
        config.paths.cache_dir = Some(PathBuf::from("~/big-disk/cache"));
        assert_eq!(config.cache_dir(home), PathBuf::from("/home/u/big-disk/cache"));
    }
}
