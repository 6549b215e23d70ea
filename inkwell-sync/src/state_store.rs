//! State store: per-notebook record of the last published version and the
//! destinations that received it.
//!
//! Persists a [`StateFile`] JSON document at `~/.inkwell/state.json`.
//! Every commit re-reads the file, applies the change and replaces it via
//! [`crate::writer::atomic_write`], so the previous state stays authoritative
//! until the rename completes.
//!
//! Destination names are kept as opaque strings; records written by a newer
//! version with unknown destinations load unchanged.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use inkwell_core::types::{DestinationName, NotebookId, Version};

use crate::error::{state_io_err, SyncError};
use crate::writer;

/// File name prefix of the per-destination logs written by earlier releases.
pub const LEGACY_LOG_PREFIX: &str = "processed_notebooks_";

/// What is known about one notebook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRecord {
    pub version: Version,
    /// Destinations confirmed published for `version`, and only for it.
    #[serde(default)]
    pub destinations: BTreeSet<DestinationName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

/// A notebook whose last attempt at `version` published nowhere.
///
/// Kept apart from [`SyncRecord`]: a failure is never a publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedAttempt {
    pub version: Version,
    pub failures: u32,
    pub last_failed_at: DateTime<Utc>,
}

/// On-disk state payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    pub notebooks: BTreeMap<NotebookId, SyncRecord>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub failed: BTreeMap<NotebookId, FailedAttempt>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StateFileCompat {
    Structured(StateFile),
    /// Bare `{ id: { version, destinations } }` map.
    Flat(BTreeMap<NotebookId, SyncRecord>),
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// Why a notebook needs work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessReason {
    NeverSynced,
    VersionChanged,
    MissingDestinations,
    Forced,
}

impl std::fmt::Display for ProcessReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProcessReason::NeverSynced => "never synced",
            ProcessReason::VersionChanged => "version changed",
            ProcessReason::MissingDestinations => "missing destinations",
            ProcessReason::Forced => "forced",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Skip,
    Process {
        destinations: BTreeSet<DestinationName>,
        reason: ProcessReason,
    },
}

/// Decide whether a notebook at `current` needs publishing, and where.
///
/// A version change resets everything: the notebook goes to every enabled
/// destination. On a version match only the enabled destinations missing
/// from the record are returned.
pub fn should_process(
    record: Option<&SyncRecord>,
    current: &Version,
    enabled: &BTreeSet<DestinationName>,
) -> Decision {
    if enabled.is_empty() {
        return Decision::Skip;
    }
    let (destinations, reason) = match record {
        None => (enabled.clone(), ProcessReason::NeverSynced),
        Some(r) if &r.version != current => (enabled.clone(), ProcessReason::VersionChanged),
        Some(r) => {
            let missing: BTreeSet<_> = enabled.difference(&r.destinations).cloned().collect();
            if missing.is_empty() {
                return Decision::Skip;
            }
            (missing, ProcessReason::MissingDestinations)
        }
    };
    Decision::Process { destinations, reason }
}

// ---------------------------------------------------------------------------
// StateStore
// ---------------------------------------------------------------------------

/// Owner of the persisted sync state. One instance per run, single writer.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    state: StateFile,
}

impl StateStore {
    /// Load the store at `path`.
    ///
    /// A missing file yields an empty store seeded from any legacy
    /// per-destination logs beside it. A present but unreadable file is an
    /// error: the run must not proceed on an assumed state.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SyncError> {
        let path = path.into();
        let state = match read_state(&path)? {
            Some(state) => state,
            None => {
                let imported = import_legacy_logs(path.parent().unwrap_or(Path::new(".")))?;
                if !imported.is_empty() {
                    tracing::info!(
                        "imported {} notebook(s) from legacy processed logs",
                        imported.len()
                    );
                }
                StateFile {
                    notebooks: imported,
                    ..StateFile::default()
                }
            }
        };
        Ok(StateStore { path, state })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> &StateFile {
        &self.state
    }

    pub fn records(&self) -> &BTreeMap<NotebookId, SyncRecord> {
        &self.state.notebooks
    }

    pub fn get(&self, id: &NotebookId) -> Option<&SyncRecord> {
        self.state.notebooks.get(id)
    }

    /// Notebooks whose latest attempt failed everywhere.
    pub fn failures(&self) -> &BTreeMap<NotebookId, FailedAttempt> {
        &self.state.failed
    }

    pub fn len(&self) -> usize {
        self.state.notebooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.notebooks.is_empty()
    }

    /// Record that `version` of `id` reached `successful`.
    ///
    /// On a version match the destination set grows by `successful`; on a
    /// mismatch the record is replaced so no destination of the old version
    /// carries over. An empty `successful` set changes nothing.
    pub fn commit(
        &mut self,
        id: &NotebookId,
        version: &Version,
        successful: &BTreeSet<DestinationName>,
    ) -> Result<(), SyncError> {
        if successful.is_empty() {
            return Ok(());
        }

        let mut latest = read_state(&self.path)?.unwrap_or_else(|| self.state.clone());
        let now = Utc::now();
        match latest.notebooks.get_mut(id) {
            Some(record) if &record.version == version => {
                record.destinations.extend(successful.iter().cloned());
                record.published_at = Some(now);
            }
            _ => {
                latest.notebooks.insert(
                    id.clone(),
                    SyncRecord {
                        version: version.clone(),
                        destinations: successful.clone(),
                        published_at: Some(now),
                    },
                );
            }
        }
        latest.failed.remove(id);
        latest.updated_at = Some(now);

        write_state(&self.path, &latest)?;
        self.state = latest;
        Ok(())
    }

    /// Note that an attempt at `version` of `id` published nowhere.
    ///
    /// Sync records are left alone; the count restarts when the version
    /// differs from the previous failure.
    pub fn record_failure(&mut self, id: &NotebookId, version: &Version) -> Result<(), SyncError> {
        let mut latest = read_state(&self.path)?.unwrap_or_else(|| self.state.clone());
        let now = Utc::now();
        let failures = match latest.failed.get(id) {
            Some(previous) if &previous.version == version => previous.failures.saturating_add(1),
            _ => 1,
        };
        latest.failed.insert(
            id.clone(),
            FailedAttempt {
                version: version.clone(),
                failures,
                last_failed_at: now,
            },
        );

        write_state(&self.path, &latest)?;
        self.state = latest;
        Ok(())
    }
}

fn read_state(path: &Path) -> Result<Option<StateFile>, SyncError> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(state_io_err(path, e)),
    };
    if contents.trim().is_empty() {
        return Ok(Some(StateFile::default()));
    }
    let parsed = serde_json::from_str::<StateFileCompat>(&contents).map_err(|source| {
        SyncError::StateCorrupt {
            path: path.to_path_buf(),
            source,
        }
    })?;
    Ok(Some(match parsed {
        StateFileCompat::Structured(state) => state,
        StateFileCompat::Flat(notebooks) => StateFile {
            notebooks,
            ..StateFile::default()
        },
    }))
}

fn write_state(path: &Path, state: &StateFile) -> Result<(), SyncError> {
    let json = serde_json::to_vec_pretty(state)?;
    writer::atomic_write(path, &json).map_err(|e| state_io_err(path, e))
}

// ---------------------------------------------------------------------------
// Legacy import
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LegacyLog {
    Versions(BTreeMap<String, serde_json::Value>),
    Ids(Vec<String>),
}

/// Map a legacy log suffix (`AppleNotesDestination`, `Obsidian`) to a
/// destination name.
fn legacy_destination_name(suffix: &str) -> DestinationName {
    let base = suffix.strip_suffix("Destination").unwrap_or(suffix);
    let mut snake = String::with_capacity(base.len() + 4);
    for (i, c) in base.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                snake.push('_');
            }
            snake.push(c.to_ascii_lowercase());
        } else {
            snake.push(c);
        }
    }
    DestinationName::from(snake)
}

fn legacy_version(value: &serde_json::Value) -> Version {
    match value {
        serde_json::Value::String(s) => Version::from(s.as_str()),
        other => Version::from(other.to_string()),
    }
}

/// Merge `processed_notebooks_<Destination>.json` files found in `dir`.
///
/// Each notebook gets the version shared by the largest group of
/// destinations; destinations that recorded another version are left out
/// and will be republished. Bare id lists carry no version and record `0`,
/// which never matches a real version token.
pub(crate) fn import_legacy_logs(
    dir: &Path,
) -> Result<BTreeMap<NotebookId, SyncRecord>, SyncError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => return Err(state_io_err(dir, e)),
    };

    let mut seen: BTreeMap<NotebookId, BTreeMap<Version, BTreeSet<DestinationName>>> =
        BTreeMap::new();
    for entry in entries {
        let path = entry.map_err(|e| state_io_err(dir, e))?.path();
        let Some(suffix) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix(LEGACY_LOG_PREFIX))
            .and_then(|n| n.strip_suffix(".json"))
            .filter(|n| !n.is_empty())
        else {
            continue;
        };
        let destination = legacy_destination_name(suffix);
        let contents = fs::read_to_string(&path).map_err(|e| state_io_err(&path, e))?;
        let log = match serde_json::from_str::<LegacyLog>(&contents) {
            Ok(log) => log,
            Err(e) => {
                tracing::warn!("ignoring unreadable legacy log {}: {e}", path.display());
                continue;
            }
        };
        let pairs: Vec<(String, Version)> = match log {
            LegacyLog::Versions(map) => map
                .into_iter()
                .map(|(id, v)| (id, legacy_version(&v)))
                .collect(),
            LegacyLog::Ids(ids) => ids.into_iter().map(|id| (id, Version::from(0u64))).collect(),
        };
        for (id, version) in pairs {
            seen.entry(NotebookId::from(id))
                .or_default()
                .entry(version)
                .or_default()
                .insert(destination.clone());
        }
    }

    Ok(seen
        .into_iter()
        .filter_map(|(id, by_version)| {
            by_version
                .into_iter()
                .max_by(|(va, a), (vb, b)| a.len().cmp(&b.len()).then_with(|| vb.cmp(va)))
                .map(|(version, destinations)| {
                    (
                        id,
                        SyncRecord {
                            version,
                            destinations,
                            published_at: None,
                        },
                    )
                })
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
