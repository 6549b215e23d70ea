//! Contracts of the external collaborators the pipeline drives.
//!
//! All of them are blocking and must be shareable between worker threads.
//! Failures are reported as [`ProviderError`] so the orchestrator can decide
//! between retrying, failing the notebook and aborting the run.

use std::path::{Path, PathBuf};

use inkwell_core::types::Item;

use crate::error::ProviderError;

/// A notebook pulled from the source into a local working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedDocument {
    pub item: Item,
    /// Location of the fetched content; meaning is shared with the renderer.
    pub path: PathBuf,
}

/// Yields the library snapshot and fetches document content.
pub trait SourceProvider: Send + Sync {
    fn list_items(&self) -> Result<Vec<Item>, ProviderError>;

    fn fetch(&self, item: &Item, work_dir: &Path) -> Result<FetchedDocument, ProviderError>;
}

/// Turns a fetched document into page images, in page order.
pub trait PageRenderer: Send + Sync {
    fn render(&self, doc: &FetchedDocument, work_dir: &Path) -> Result<Vec<PathBuf>, ProviderError>;
}

/// Handwriting recognition of one page image.
pub trait OcrProvider: Send + Sync {
    fn recognize(&self, image: &Path) -> Result<String, ProviderError>;
}

/// Language-model cleanup of recognized text.
pub trait CleanupProvider: Send + Sync {
    fn clean(&self, text: &str) -> Result<String, ProviderError>;
}

/// Cleanup that returns its input; used when cleanup is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughCleanup;

impl CleanupProvider for PassthroughCleanup {
    fn clean(&self, text: &str) -> Result<String, ProviderError> {
        Ok(text.to_string())
    }
}
