//! Destination dispatch.
//!
//! A [`Dispatcher`] fans one [`PublishUnit`] out to a set of destinations and
//! returns one result per destination. Destinations are isolated from each
//! other: an error or panic in one never stops the others or changes their
//! results. Failures are reported, never retried here.

use std::collections::{BTreeMap, BTreeSet};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Mutex;

use inkwell_core::types::{DestinationName, NotebookId, Version};

use crate::error::DestinationError;

/// Everything a destination needs to publish one notebook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishUnit {
    pub notebook_id: NotebookId,
    pub version: Version,
    /// Notebook name as shown on the tablet.
    pub notebook_name: String,
    /// Display title: folder path and name joined with ` / `.
    pub title: String,
    /// Sanitized top-level folder, `None` for notebooks at the root.
    pub sub_folder: Option<String>,
    /// Folder names from the top-level folder down to the parent.
    pub folder_path: Vec<String>,
    pub text: String,
    pub attachments: Vec<PathBuf>,
}

impl PublishUnit {
    /// Source location as `Folder/Sub/Name`.
    pub fn source_path(&self) -> String {
        self.folder_path
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.notebook_name.as_str()))
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// A publish target.
///
/// Publishing must be idempotent by overwrite: publishing the same notebook
/// again replaces the earlier copy.
pub trait Destination: Send + Sync {
    fn name(&self) -> DestinationName;

    /// `false` when two publishes must never run at the same time, e.g.
    /// when they drive one shared desktop application.
    fn concurrency_safe(&self) -> bool {
        true
    }

    fn publish(&self, unit: &PublishUnit) -> Result<(), DestinationError>;
}

pub type DispatchResults = BTreeMap<DestinationName, Result<(), DestinationError>>;

/// Names of the destinations that succeeded.
pub fn succeeded(results: &DispatchResults) -> BTreeSet<DestinationName> {
    results
        .iter()
        .filter(|(_, r)| r.is_ok())
        .map(|(name, _)| name.clone())
        .collect()
}

/// Destinations by name, plus the lock serializing non-concurrent ones.
#[derive(Default)]
pub struct Dispatcher {
    destinations: BTreeMap<DestinationName, Box<dyn Destination>>,
    serial: Mutex<()>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a destination, replacing one registered under the same name.
    pub fn register(&mut self, destination: Box<dyn Destination>) {
        self.destinations.insert(destination.name(), destination);
    }

    pub fn with(mut self, destination: Box<dyn Destination>) -> Self {
        self.register(destination);
        self
    }

    pub fn names(&self) -> BTreeSet<DestinationName> {
        self.destinations.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }

    /// Publish `unit` to every destination in `targets`.
    ///
    /// The result map has exactly one entry per target. Unregistered names
    /// yield [`DestinationError::NotConfigured`].
    pub fn dispatch(
        &self,
        unit: &PublishUnit,
        targets: &BTreeSet<DestinationName>,
    ) -> DispatchResults {
        targets
            .iter()
            .map(|name| {
                let result = match self.destinations.get(name) {
                    Some(destination) => self.publish_one(destination.as_ref(), unit),
                    None => Err(DestinationError::NotConfigured(name.clone())),
                };
                match &result {
                    Ok(()) => tracing::info!("published {} to {name}", unit.title),
                    Err(e) => tracing::warn!("publishing {} to {name} failed: {e}", unit.title),
                }
                (name.clone(), result)
            })
            .collect()
    }

    fn publish_one(
        &self,
        destination: &dyn Destination,
        unit: &PublishUnit,
    ) -> Result<(), DestinationError> {
        let _guard = if destination.concurrency_safe() {
            None
        } else {
            Some(self.serial.lock().unwrap_or_else(|e| e.into_inner()))
        };
        panic::catch_unwind(AssertUnwindSafe(|| destination.publish(unit))).unwrap_or_else(|_| {
            Err(DestinationError::Panicked {
                destination: destination.name(),
            })
        })
    }
}
