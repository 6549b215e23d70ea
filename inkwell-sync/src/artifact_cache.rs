//! Artifact cache: cleaned text and page images keyed by notebook + version.
//!
//! ```text
//! <root>/
//!   <sha256(notebook id)[..16]>/
//!     <sha256(version)[..16]>/
//!       manifest.json        (written last; its presence marks a complete entry)
//!       pages/<image files>
//! ```
//!
//! Only exact `(notebook, version)` matches are hits. Entries for older
//! versions of a notebook are removed by [`ArtifactCache::invalidate_stale`]
//! once a newer version is cached; there is no size- or age-based eviction.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use inkwell_core::types::{NotebookId, Version};

use crate::error::{io_err, SyncError};
use crate::writer;

const MANIFEST: &str = "manifest.json";
const PAGES_DIR: &str = "pages";

/// A reusable processing result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub notebook_id: NotebookId,
    pub version: Version,
    pub text: String,
    /// Page images inside the cache, in page order.
    pub pages: Vec<PathBuf>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    notebook_id: NotebookId,
    version: Version,
    text: String,
    /// File names under `pages/`, in page order.
    pages: Vec<String>,
    created_at: DateTime<Utc>,
}

/// Result of [`ArtifactCache::prune`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub removed_notebooks: usize,
    pub kept_notebooks: usize,
}

/// Disk usage of the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheUsage {
    pub entries: usize,
    pub bytes: u64,
}

pub(crate) fn short_digest(s: &str) -> String {
    let mut h = Sha256::new();
    h.update(s.as_bytes());
    let mut hex = hex::encode(h.finalize());
    hex.truncate(16);
    hex
}

type KeyLock = Arc<Mutex<()>>;

pub struct ArtifactCache {
    root: PathBuf,
    locks: Mutex<HashMap<(NotebookId, Version), KeyLock>>,
}

impl ArtifactCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        ArtifactCache {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn notebook_dir(&self, id: &NotebookId) -> PathBuf {
        self.root.join(short_digest(id.as_str()))
    }

    fn entry_dir(&self, id: &NotebookId, version: &Version) -> PathBuf {
        self.notebook_dir(id).join(short_digest(version.as_str()))
    }

    /// Writes of one key are serialized; distinct keys proceed in parallel.
    fn key_lock(&self, id: &NotebookId, version: &Version) -> KeyLock {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry((id.clone(), version.clone()))
            .or_default()
            .clone()
    }

    /// The artifact for exactly `(id, version)`, if a complete one exists.
    pub fn get(&self, id: &NotebookId, version: &Version) -> Result<Option<Artifact>, SyncError> {
        let dir = self.entry_dir(id, version);
        let manifest_path = dir.join(MANIFEST);
        let contents = match fs::read_to_string(&manifest_path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err(&manifest_path, e)),
        };
        let manifest: Manifest = match serde_json::from_str(&contents) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("ignoring corrupt cache manifest {}: {e}", manifest_path.display());
                return Ok(None);
            }
        };
        if &manifest.notebook_id != id || &manifest.version != version {
            return Ok(None);
        }

        let pages: Vec<PathBuf> = manifest
            .pages
            .iter()
            .map(|name| dir.join(PAGES_DIR).join(name))
            .collect();
        if let Some(missing) = pages.iter().find(|p| !p.is_file()) {
            tracing::warn!("cache entry for {id} lost page {}", missing.display());
            return Ok(None);
        }

        Ok(Some(Artifact {
            notebook_id: manifest.notebook_id,
            version: manifest.version,
            text: manifest.text,
            pages,
            created_at: manifest.created_at,
        }))
    }

    /// Store `text` and copies of `pages` under `(id, version)`.
    ///
    /// Any previous entry for the same key is replaced. The manifest is
    /// written last, so a partial entry is never returned by [`Self::get`].
    pub fn put(
        &self,
        id: &NotebookId,
        version: &Version,
        text: &str,
        pages: &[PathBuf],
    ) -> Result<Artifact, SyncError> {
        let lock = self.key_lock(id, version);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let dir = self.entry_dir(id, version);
        if dir.exists() {
            fs::remove_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        }
        let pages_dir = dir.join(PAGES_DIR);
        fs::create_dir_all(&pages_dir).map_err(|e| io_err(&pages_dir, e))?;

        let mut names = Vec::with_capacity(pages.len());
        let mut stored = Vec::with_capacity(pages.len());
        for (i, src) in pages.iter().enumerate() {
            let name = src
                .file_name()
                .and_then(|n| n.to_str())
                .filter(|n| !names.iter().any(|seen: &String| seen.as_str() == *n))
                .map(str::to_string)
                .unwrap_or_else(|| format!("page-{}.png", i + 1));
            let dest = pages_dir.join(&name);
            fs::copy(src, &dest).map_err(|e| io_err(src, e))?;
            names.push(name);
            stored.push(dest);
        }

        let manifest = Manifest {
            notebook_id: id.clone(),
            version: version.clone(),
            text: text.to_string(),
            pages: names,
            created_at: Utc::now(),
        };
        let manifest_path = dir.join(MANIFEST);
        let json = serde_json::to_vec_pretty(&manifest)?;
        writer::atomic_write(&manifest_path, &json).map_err(|e| io_err(&manifest_path, e))?;
        tracing::debug!("cached artifact for {id} at version {version}");

        Ok(Artifact {
            notebook_id: manifest.notebook_id,
            version: manifest.version,
            text: manifest.text,
            pages: stored,
            created_at: manifest.created_at,
        })
    }

    /// Remove every entry of `id` except the one for `current`.
    /// Returns the number of entries removed.
    pub fn invalidate_stale(&self, id: &NotebookId, current: &Version) -> Result<usize, SyncError> {
        let dir = self.notebook_dir(id);
        let keep = short_digest(current.as_str());
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(io_err(&dir, e)),
        };
        let mut removed = 0;
        for entry in entries {
            let path = entry.map_err(|e| io_err(&dir, e))?.path();
            if path.file_name().and_then(|n| n.to_str()) == Some(keep.as_str()) {
                continue;
            }
            if path.is_dir() {
                fs::remove_dir_all(&path).map_err(|e| io_err(&path, e))?;
            } else {
                fs::remove_file(&path).map_err(|e| io_err(&path, e))?;
            }
            removed += 1;
        }
        if removed > 0 {
            tracing::debug!("removed {removed} stale cache entries for {id}");
        }
        Ok(removed)
    }

    /// Remove cached notebooks whose id is not in `keep`. Directories without
    /// a readable manifest are removed as well.
    pub fn prune(&self, keep: &BTreeSet<NotebookId>) -> Result<PruneReport, SyncError> {
        let mut report = PruneReport::default();
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(report),
            Err(e) => return Err(io_err(&self.root, e)),
        };
        for entry in entries {
            let path = entry.map_err(|e| io_err(&self.root, e))?.path();
            if !path.is_dir() {
                continue;
            }
            let owner = notebook_of(&path)?;
            if owner.as_ref().is_some_and(|id| keep.contains(id)) {
                report.kept_notebooks += 1;
            } else {
                fs::remove_dir_all(&path).map_err(|e| io_err(&path, e))?;
                report.removed_notebooks += 1;
            }
        }
        Ok(report)
    }

    /// Count complete entries and their bytes on disk.
    pub fn usage(&self) -> Result<CacheUsage, SyncError> {
        let mut usage = CacheUsage::default();
        if !self.root.exists() {
            return Ok(usage);
        }
        walk(&self.root, &mut |path, len| {
            usage.bytes += len;
            if path.file_name().and_then(|n| n.to_str()) == Some(MANIFEST) {
                usage.entries += 1;
            }
        })?;
        Ok(usage)
    }
}

/// Notebook id recorded by any manifest under a notebook directory.
fn notebook_of(notebook_dir: &Path) -> Result<Option<NotebookId>, SyncError> {
    let entries = fs::read_dir(notebook_dir).map_err(|e| io_err(notebook_dir, e))?;
    for entry in entries {
        let manifest_path = entry.map_err(|e| io_err(notebook_dir, e))?.path().join(MANIFEST);
        let Ok(contents) = fs::read_to_string(&manifest_path) else {
            continue;
        };
        if let Ok(manifest) = serde_json::from_str::<Manifest>(&contents) {
            return Ok(Some(manifest.notebook_id));
        }
    }
    Ok(None)
}

fn walk(dir: &Path, visit: &mut dyn FnMut(&Path, u64)) -> Result<(), SyncError> {
    for entry in fs::read_dir(dir).map_err(|e| io_err(dir, e))? {
        let entry = entry.map_err(|e| io_err(dir, e))?;
        let path = entry.path();
        let meta = entry.metadata().map_err(|e| io_err(&path, e))?;
        if meta.is_dir() {
            walk(&path, visit)?;
        } else {
            visit(&path, meta.len());
        }
    }
    Ok(())
}
