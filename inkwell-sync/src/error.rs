//! Error types for inkwell-sync.
//!
//! Granularity decides containment: [`ProviderError`], [`TreeError`] and
//! [`DestinationError`] are reported per notebook, while a [`SyncError`]
//! returned from a run is fatal to the whole run.

use std::path::PathBuf;

use thiserror::Error;

use inkwell_core::{ConfigError, DestinationName, ItemId};
use inkwell_render::RenderError;

/// Run-level errors.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("render error: {0}")]
    Render(#[from] RenderError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading or writing the persisted sync state failed.
    #[error("state store I/O error at {path}: {source}")]
    StateIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The state file exists but is not a readable state document.
    #[error("state store at {path} is corrupt: {source}")]
    StateCorrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// `--notebook` named nothing in the library.
    #[error("notebook not found in library: {0}")]
    NotebookNotFound(String),

    /// A source listing could not be obtained; nothing can be planned.
    #[error("source listing failed: {0}")]
    Listing(ProviderError),

    /// JSON serialization error (cache manifests, state encoding).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    /// Errors on the persisted state; a run must stop on these.
    pub fn is_state_store(&self) -> bool {
        matches!(self, SyncError::StateIo { .. } | SyncError::StateCorrupt { .. })
    }
}

/// Folder graph problems. The affected notebook is skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("corrupt hierarchy: parent chain of {item} did not reach the root within {steps} steps")]
    CorruptHierarchy { item: ItemId, steps: usize },
}

/// Failure of a single destination's publish call.
#[derive(Debug, Error)]
pub enum DestinationError {
    #[error("destination {0} is not configured")]
    NotConfigured(DestinationName),

    #[error("destination {destination} panicked while publishing")]
    Panicked { destination: DestinationName },

    #[error("render error: {0}")]
    Render(#[from] RenderError),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("vault directory does not exist: {0}")]
    VaultMissing(PathBuf),

    #[error("script exited with {status}: {stderr}")]
    Script { status: String, stderr: String },

    #[error("script did not finish within {secs}s")]
    Timeout { secs: u64 },
}

/// Classified failure of an external collaborator (source, renderer, OCR, cleanup).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Rate limit, quota, timeout, server error. Retried with backoff.
    #[error("transient: {0}")]
    Transient(String),

    /// Credentials rejected. Aborts the run.
    #[error("terminal: {0}")]
    Terminal(String),

    /// This notebook cannot be processed (no pages, bad request). Not retried.
    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProviderError::Terminal(_))
    }
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn state_io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::StateIo {
        path: path.into(),
        source,
    }
}

pub(crate) fn dest_io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DestinationError {
    DestinationError::Io {
        path: path.into(),
        source,
    }
}
