//! Sync planning: which notebooks enter the pipeline this run, and for
//! which destinations.
//!
//! The plan is deterministic for a given snapshot and state: candidates are
//! ordered oldest-modified first (ties by id), so a per-run cap always
//! works through the backlog in the same order. Notebooks whose last attempt
//! at their current version failed go behind every other candidate, least
//! recently failed first, so one broken notebook cannot starve the rest.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use inkwell_core::config::Config;
use inkwell_core::types::{DestinationName, Item, NotebookId};

use crate::error::SyncError;
use crate::state_store::{should_process, Decision, FailedAttempt, ProcessReason, SyncRecord};
use crate::tree::{self, FolderIndex, Resolution};

/// Planner inputs taken from configuration and command-line flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanOptions {
    /// `0` means unlimited.
    pub max_notebooks_per_run: usize,
    pub enabled: BTreeSet<DestinationName>,
    /// `/`-separated folder prefix, e.g. `Work/Projects`.
    pub root_path_filter: Option<String>,
    pub trash_marker: String,
    pub skip_non_native: bool,
    /// Restrict the run to one notebook, by name or id. An up-to-date
    /// notebook selected this way is republished everywhere.
    pub only_notebook: Option<String>,
    /// Republish every candidate to every enabled destination.
    pub force: bool,
}

impl PlanOptions {
    pub fn from_config(config: &Config) -> Self {
        PlanOptions {
            max_notebooks_per_run: config.sync.max_notebooks_per_run,
            enabled: config.enabled_destinations(),
            root_path_filter: config.sync.root_path_filter.clone(),
            trash_marker: config.sync.trash_marker.clone(),
            skip_non_native: config.sync.skip_non_native,
            only_notebook: None,
            force: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Deleted,
    Trashed,
    TrashMarker,
    Unnamed,
    NonNative { file_type: String },
    OutsideFilter,
    UpToDate,
    CorruptHierarchy(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Deleted => f.write_str("deleted"),
            SkipReason::Trashed => f.write_str("in trash"),
            SkipReason::TrashMarker => f.write_str("trash marker"),
            SkipReason::Unnamed => f.write_str("no name"),
            SkipReason::NonNative { file_type } => write!(f, "not a notebook ({file_type})"),
            SkipReason::OutsideFilter => f.write_str("outside path filter"),
            SkipReason::UpToDate => f.write_str("up to date"),
            SkipReason::CorruptHierarchy(msg) => write!(f, "corrupt hierarchy: {msg}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedItem {
    pub id: NotebookId,
    pub name: String,
    pub reason: SkipReason,
}

/// One notebook to process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    pub notebook: Item,
    /// Sanitized top-level folder, the destination sub-folder.
    pub top_level_folder: Option<String>,
    pub folder_path: Vec<String>,
    pub title: String,
    pub destinations: BTreeSet<DestinationName>,
    pub reason: ProcessReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub entries: Vec<PlanEntry>,
    pub skipped: Vec<SkippedItem>,
    /// Notebooks that need work but were cut by the per-run cap.
    pub deferred: Vec<NotebookId>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Folder name safe for destination folders: `/`, `\` and spaces become `_`.
/// A name made only of dots (or nothing) would name the current or parent
/// directory, so its dots become `_` as well.
pub fn sanitize_folder_name(name: &str) -> String {
    let safe = name.replace(['/', '\\', ' '], "_");
    if safe.chars().all(|c| c == '.') {
        return "_".repeat(safe.len().max(1));
    }
    safe
}

/// `Folder / Sub / Name`, or just the name at the root.
pub fn display_title(folder_path: &[String], name: &str) -> String {
    folder_path
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(name))
        .collect::<Vec<_>>()
        .join(" / ")
}

fn filter_segments(filter: &str) -> Vec<&str> {
    filter
        .split('/')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn within_filter(folder_path: &[String], segments: &[&str]) -> bool {
    segments.len() <= folder_path.len()
        && segments.iter().zip(folder_path).all(|(want, have)| *want == have.as_str())
}

fn selected(item: &Item, wanted: &str) -> bool {
    item.id.as_str() == wanted || item.name.trim() == wanted.trim()
}

/// Filter reason for a document, or its resolution when it is a candidate.
fn classify(
    index: &FolderIndex,
    item: &Item,
    options: &PlanOptions,
    segments: &[&str],
) -> Result<Resolution, SkipReason> {
    if item.deleted {
        return Err(SkipReason::Deleted);
    }
    if item.name.trim().is_empty() {
        return Err(SkipReason::Unnamed);
    }
    let resolution = tree::resolve(index, item).map_err(|e| {
        tracing::warn!("skipping {}: {e}", item.name);
        SkipReason::CorruptHierarchy(e.to_string())
    })?;
    if let Some(orphan) = &resolution.orphaned_parent {
        tracing::warn!(
            "{} ({}) references unknown parent {orphan}; treating it as the root",
            item.name,
            item.id
        );
    }
    if item.in_trash() || resolution.trashed {
        return Err(SkipReason::Trashed);
    }
    let marker = options.trash_marker.as_str();
    if !marker.is_empty()
        && (item.name.starts_with(marker)
            || resolution.folder_path.iter().any(|f| f.starts_with(marker)))
    {
        return Err(SkipReason::TrashMarker);
    }
    if options.skip_non_native && !item.is_native_notebook() {
        return Err(SkipReason::NonNative {
            file_type: item.file_type.clone().unwrap_or_default(),
        });
    }
    if !within_filter(&resolution.folder_path, segments) {
        return Err(SkipReason::OutsideFilter);
    }
    Ok(resolution)
}

/// Build the ordered plan for this run.
///
/// Fails only when `only_notebook` names no document in the library.
pub fn plan(
    items: &[Item],
    records: &BTreeMap<NotebookId, SyncRecord>,
    failed: &BTreeMap<NotebookId, FailedAttempt>,
    options: &PlanOptions,
) -> Result<Plan, SyncError> {
    let index = tree::build_index(items);
    let segments = options
        .root_path_filter
        .as_deref()
        .map(filter_segments)
        .unwrap_or_default();

    let mut documents: Vec<&Item> = items.iter().filter(|i| i.is_document()).collect();
    if let Some(wanted) = &options.only_notebook {
        documents.retain(|item| selected(item, wanted));
        if documents.is_empty() {
            return Err(SyncError::NotebookNotFound(wanted.clone()));
        }
    }
    // `None` (no failure at this version) sorts before any failure time.
    let last_failure = |item: &Item| {
        failed
            .get(&item.id)
            .filter(|f| f.version == item.version)
            .map(|f| f.last_failed_at)
    };
    documents.sort_by(|a, b| {
        last_failure(a)
            .cmp(&last_failure(b))
            .then_with(|| a.modified_at.cmp(&b.modified_at))
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut plan = Plan::default();
    for item in documents {
        let skip = |reason| SkippedItem {
            id: item.id.clone(),
            name: item.name.clone(),
            reason,
        };
        let resolution = match classify(&index, item, options, &segments) {
            Ok(r) => r,
            Err(reason) => {
                plan.skipped.push(skip(reason));
                continue;
            }
        };

        let decision = if options.force || options.only_notebook.is_some() {
            match should_process(records.get(&item.id), &item.version, &options.enabled) {
                Decision::Skip if !options.enabled.is_empty() => Decision::Process {
                    destinations: options.enabled.clone(),
                    reason: ProcessReason::Forced,
                },
                Decision::Process { .. } if options.force => Decision::Process {
                    destinations: options.enabled.clone(),
                    reason: ProcessReason::Forced,
                },
                other => other,
            }
        } else {
            should_process(records.get(&item.id), &item.version, &options.enabled)
        };

        let Decision::Process { destinations, reason } = decision else {
            plan.skipped.push(skip(SkipReason::UpToDate));
            continue;
        };

        if options.max_notebooks_per_run > 0
            && plan.entries.len() >= options.max_notebooks_per_run
        {
            plan.deferred.push(item.id.clone());
            continue;
        }

        plan.entries.push(PlanEntry {
            notebook: item.clone(),
            top_level_folder: resolution.top_level.as_deref().map(sanitize_folder_name),
            title: display_title(&resolution.folder_path, item.name.trim()),
            folder_path: resolution.folder_path,
            destinations,
            reason,
        });
    }

    tracing::debug!(
        "plan: {} to process, {} skipped, {} deferred",
        plan.entries.len(),
        plan.skipped.len(),
        plan.deferred.len()
    );
    Ok(plan)
}
