//! Pipeline orchestration.
//!
//! Per planned notebook:
//!
//! ```text
//! Planned -> Fetching -> Rendering -> OcrPending -> Cleaning -> CacheWriting
//!         -> Dispatching -> Committed | PartiallyCommitted | Failed
//! ```
//!
//! A cache hit jumps from `Planned` straight to `Dispatching`. External calls
//! are retried with backoff on transient failures; a notebook whose retries
//! are exhausted fails without a sync record, so the next run picks it up
//! again. The failed attempt is noted so the planner can queue it behind
//! notebooks that have not failed. A terminal provider failure stops the run after the
//! notebook in flight. A state store failure stops the run with an error.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use inkwell_core::types::{DestinationName, NotebookId};

use crate::artifact_cache::{self, Artifact, ArtifactCache};
use crate::dispatch::{self, Dispatcher, PublishUnit};
use crate::error::{ProviderError, SyncError};
use crate::planner::{self, PlanEntry, PlanOptions, SkippedItem};
use crate::providers::{CleanupProvider, OcrProvider, PageRenderer, SourceProvider};
use crate::retry::{classify_provider_error, retry_with_backoff, RetryConfig};
use crate::state_store::{ProcessReason, StateStore};

// ---------------------------------------------------------------------------
// Stages and outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Planned,
    Fetching,
    Rendering,
    OcrPending,
    Cleaning,
    CacheWriting,
    Dispatching,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Planned => "planned",
            Stage::Fetching => "fetching",
            Stage::Rendering => "rendering",
            Stage::OcrPending => "ocr",
            Stage::Cleaning => "cleaning",
            Stage::CacheWriting => "cache-writing",
            Stage::Dispatching => "dispatching",
        };
        f.write_str(s)
    }
}

/// Error kind reported for a failed notebook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Retries exhausted on a rate limit, timeout or server error.
    TransientExternal,
    /// Credentials rejected; the run was aborted.
    TerminalExternal,
    /// The provider cannot handle this notebook.
    Unavailable,
    /// Every destination failed.
    Destination,
    /// The artifact could not be cached.
    Cache,
    /// Local filesystem failure outside the cache.
    Io,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::TransientExternal => "transient external error",
            FailureKind::TerminalExternal => "terminal external error",
            FailureKind::Unavailable => "unavailable",
            FailureKind::Destination => "destination error",
            FailureKind::Cache => "cache error",
            FailureKind::Io => "io error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Committed {
        destinations: BTreeSet<DestinationName>,
    },
    PartiallyCommitted {
        succeeded: BTreeSet<DestinationName>,
        failed: BTreeMap<DestinationName, String>,
    },
    Failed {
        stage: Stage,
        kind: FailureKind,
        message: String,
    },
}

impl Outcome {
    /// Destinations to commit, `None` for failures.
    fn committed_destinations(&self) -> Option<&BTreeSet<DestinationName>> {
        match self {
            Outcome::Committed { destinations } => Some(destinations),
            Outcome::PartiallyCommitted { succeeded, .. } => Some(succeeded),
            Outcome::Failed { .. } => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotebookReport {
    pub id: NotebookId,
    pub title: String,
    pub reason: ProcessReason,
    /// The artifact came from the cache; OCR and cleanup were not run.
    pub cache_hit: bool,
    pub outcome: Outcome,
}

/// A plan entry as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedNotebook {
    pub id: NotebookId,
    pub title: String,
    pub destinations: BTreeSet<DestinationName>,
    pub reason: ProcessReason,
}

impl From<&PlanEntry> for PlannedNotebook {
    fn from(e: &PlanEntry) -> Self {
        PlannedNotebook {
            id: e.notebook.id.clone(),
            title: e.title.clone(),
            destinations: e.destinations.clone(),
            reason: e.reason,
        }
    }
}

/// Everything a run did, in plan order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub dry_run: bool,
    pub planned: Vec<PlannedNotebook>,
    pub reports: Vec<NotebookReport>,
    pub skipped: Vec<SkippedItem>,
    /// Needed work but did not run: per-run cap, cancellation or abort.
    pub deferred: Vec<NotebookId>,
    /// Set when a terminal provider failure stopped the run.
    pub aborted: Option<String>,
}

impl RunSummary {
    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.reports.iter().filter(|r| pred(&r.outcome)).count()
    }

    pub fn committed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Committed { .. }))
    }

    pub fn partially_committed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::PartiallyCommitted { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(Outcome::is_failed)
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Shared flag checked between notebooks. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

struct StageFailure {
    stage: Stage,
    kind: FailureKind,
    message: String,
}

impl StageFailure {
    fn provider(stage: Stage, e: ProviderError) -> Self {
        let kind = match e {
            ProviderError::Transient(_) => FailureKind::TransientExternal,
            ProviderError::Terminal(_) => FailureKind::TerminalExternal,
            ProviderError::Unavailable(_) => FailureKind::Unavailable,
        };
        StageFailure {
            stage,
            kind,
            message: e.to_string(),
        }
    }

    fn into_outcome(self) -> Outcome {
        Outcome::Failed {
            stage: self.stage,
            kind: self.kind,
            message: self.message,
        }
    }
}

/// Page text as stored in the cache and published.
pub fn assemble_text(pages: &[String]) -> String {
    pages
        .iter()
        .enumerate()
        .map(|(i, text)| format!("--- Page {} ---\n{}\n\n", i + 1, text.trim_end()))
        .collect()
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Shared bookkeeping of one run across workers.
struct RunState<'s> {
    next: AtomicUsize,
    halt: AtomicBool,
    store: Mutex<&'s mut StateStore>,
    reports: Mutex<Vec<(usize, NotebookReport)>>,
    fatal: Mutex<Option<SyncError>>,
    aborted: Mutex<Option<String>>,
}

pub struct Pipeline {
    source: Box<dyn SourceProvider>,
    pages: Box<dyn PageRenderer>,
    ocr: Box<dyn OcrProvider>,
    cleanup: Box<dyn CleanupProvider>,
    dispatcher: Dispatcher,
    cache: ArtifactCache,
    retry: RetryConfig,
    work_dir: PathBuf,
    workers: usize,
    cancel: CancelToken,
}

impl Pipeline {
    pub fn new(
        source: Box<dyn SourceProvider>,
        pages: Box<dyn PageRenderer>,
        ocr: Box<dyn OcrProvider>,
        cleanup: Box<dyn CleanupProvider>,
        dispatcher: Dispatcher,
        cache: ArtifactCache,
    ) -> Self {
        let work_dir = std::env::temp_dir().join("inkwell-work");
        Pipeline {
            source,
            pages,
            ocr,
            cleanup,
            dispatcher,
            cache,
            retry: RetryConfig::default(),
            work_dir,
            workers: 1,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    /// Process up to `workers` notebooks at once. `0` is treated as `1`.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// List the library, plan and, unless `dry_run`, process the plan.
    ///
    /// Returns `Err` only for run-level failures: the listing could not be
    /// obtained, `--notebook` matched nothing, or the state store could not
    /// be written. Everything else is reported per notebook in the summary.
    pub fn run(
        &self,
        store: &mut StateStore,
        options: &PlanOptions,
        dry_run: bool,
    ) -> Result<RunSummary, SyncError> {
        let items = retry_with_backoff(&self.retry, "listing", classify_provider_error, || {
            self.source.list_items()
        })
        .map_err(SyncError::Listing)?;
        tracing::debug!("source listed {} item(s)", items.len());

        let plan = planner::plan(&items, store.records(), store.failures(), options)?;
        let mut summary = RunSummary {
            dry_run,
            planned: plan.entries.iter().map(PlannedNotebook::from).collect(),
            skipped: plan.skipped,
            deferred: plan.deferred,
            ..RunSummary::default()
        };
        if dry_run || plan.entries.is_empty() {
            return Ok(summary);
        }

        let entries = plan.entries;
        let run = RunState {
            next: AtomicUsize::new(0),
            halt: AtomicBool::new(false),
            store: Mutex::new(store),
            reports: Mutex::new(Vec::with_capacity(entries.len())),
            fatal: Mutex::new(None),
            aborted: Mutex::new(None),
        };

        let workers = self.workers.min(entries.len());
        if workers <= 1 {
            self.drain(&entries, &run);
        } else {
            tracing::debug!("processing with {workers} workers");
            std::thread::scope(|s| {
                for _ in 0..workers {
                    s.spawn(|| self.drain(&entries, &run));
                }
            });
        }

        if let Some(e) = run.fatal.into_inner().unwrap_or_else(|e| e.into_inner()) {
            return Err(e);
        }

        let mut reports = run.reports.into_inner().unwrap_or_else(|e| e.into_inner());
        reports.sort_by_key(|(i, _)| *i);
        let done: BTreeSet<usize> = reports.iter().map(|(i, _)| *i).collect();
        let mut deferred: Vec<NotebookId> = entries
            .iter()
            .enumerate()
            .filter(|(i, _)| !done.contains(i))
            .map(|(_, e)| e.notebook.id.clone())
            .collect();
        deferred.append(&mut summary.deferred);
        summary.deferred = deferred;
        summary.reports = reports.into_iter().map(|(_, r)| r).collect();
        summary.aborted = run.aborted.into_inner().unwrap_or_else(|e| e.into_inner());

        if self.cancel.is_cancelled() {
            tracing::warn!("run cancelled; {} notebook(s) deferred", summary.deferred.len());
        }
        Ok(summary)
    }

    /// Worker loop: take the next entry until the plan is exhausted, the run
    /// is cancelled or a worker halted it.
    fn drain(&self, entries: &[PlanEntry], run: &RunState<'_>) {
        loop {
            if run.halt.load(Ordering::SeqCst) || self.cancel.is_cancelled() {
                return;
            }
            let i = run.next.fetch_add(1, Ordering::SeqCst);
            let Some(entry) = entries.get(i) else {
                return;
            };

            let report = self.process(entry);

            let (id, version) = (&entry.notebook.id, &entry.notebook.version);
            let saved = match &report.outcome {
                Outcome::Failed {
                    kind: FailureKind::TerminalExternal,
                    ..
                } => Ok(()),
                Outcome::Failed { .. } => lock(&run.store).record_failure(id, version),
                outcome => match outcome.committed_destinations() {
                    Some(successful) => lock(&run.store).commit(id, version, successful),
                    None => Ok(()),
                },
            };
            if let Err(e) = saved {
                tracing::error!("state store write failed for {}: {e}", entry.title);
                let mut fatal = lock(&run.fatal);
                if fatal.is_none() {
                    *fatal = Some(e);
                }
                run.halt.store(true, Ordering::SeqCst);
                return;
            }

            if let Outcome::Failed {
                kind: FailureKind::TerminalExternal,
                message,
                ..
            } = &report.outcome
            {
                let mut aborted = lock(&run.aborted);
                if aborted.is_none() {
                    *aborted = Some(message.clone());
                }
                run.halt.store(true, Ordering::SeqCst);
            }
            lock(&run.reports).push((i, report));
        }
    }

    fn process(&self, entry: &PlanEntry) -> NotebookReport {
        let id = &entry.notebook.id;
        tracing::info!(
            "processing {} ({id}) for {} destination(s): {}",
            entry.title,
            entry.destinations.len(),
            entry.reason
        );

        let cached = match self.cache.get(id, &entry.notebook.version) {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!("cache lookup for {id} failed, reprocessing: {e}");
                None
            }
        };
        let cache_hit = cached.is_some();

        let outcome = match cached {
            Some(artifact) => {
                tracing::debug!("{id}: cache hit, republishing only");
                self.publish(entry, &artifact)
            }
            None => match self.produce_artifact(entry) {
                Ok(artifact) => self.publish(entry, &artifact),
                Err(failure) => failure.into_outcome(),
            },
        };

        match &outcome {
            Outcome::Committed { .. } => tracing::info!("{}: committed", entry.title),
            Outcome::PartiallyCommitted { failed, .. } => {
                tracing::warn!("{}: partially committed, {} failed", entry.title, failed.len())
            }
            Outcome::Failed { stage, kind, message } => {
                tracing::warn!("{}: failed while {stage} ({kind}): {message}", entry.title)
            }
        }

        NotebookReport {
            id: id.clone(),
            title: entry.title.clone(),
            reason: entry.reason,
            cache_hit,
            outcome,
        }
    }

    /// Fetch, render, recognize and clean, then cache the result.
    fn produce_artifact(&self, entry: &PlanEntry) -> Result<Artifact, StageFailure> {
        let item = &entry.notebook;
        // Source ids are opaque and may hold `/` or `..`.
        let work = self.work_dir.join(artifact_cache::short_digest(item.id.as_str()));
        std::fs::create_dir_all(&work).map_err(|e| StageFailure {
            stage: Stage::Fetching,
            kind: FailureKind::Io,
            message: format!("{}: {e}", work.display()),
        })?;

        let result = self.produce_in(entry, &work);
        if let Err(e) = std::fs::remove_dir_all(&work) {
            tracing::debug!("could not remove work dir {}: {e}", work.display());
        }
        result
    }

    fn produce_in(&self, entry: &PlanEntry, work: &Path) -> Result<Artifact, StageFailure> {
        let item = &entry.notebook;

        tracing::debug!("{}: {}", item.id, Stage::Fetching);
        let doc = retry_with_backoff(&self.retry, "fetch", classify_provider_error, || {
            self.source.fetch(item, work)
        })
        .map_err(|e| StageFailure::provider(Stage::Fetching, e))?;

        tracing::debug!("{}: {}", item.id, Stage::Rendering);
        let pages = retry_with_backoff(&self.retry, "render", classify_provider_error, || {
            self.pages.render(&doc, work)
        })
        .map_err(|e| StageFailure::provider(Stage::Rendering, e))?;
        if pages.is_empty() {
            return Err(StageFailure::provider(
                Stage::Rendering,
                ProviderError::Unavailable(format!("no pages rendered for {}", item.name)),
            ));
        }

        tracing::debug!("{}: {} ({} pages)", item.id, Stage::OcrPending, pages.len());
        let mut raw = Vec::with_capacity(pages.len());
        for page in &pages {
            let text = retry_with_backoff(&self.retry, "ocr", classify_provider_error, || {
                self.ocr.recognize(page)
            })
            .map_err(|e| StageFailure::provider(Stage::OcrPending, e))?;
            raw.push(text);
        }

        tracing::debug!("{}: {}", item.id, Stage::Cleaning);
        let mut cleaned = Vec::with_capacity(raw.len());
        for text in &raw {
            if text.trim().is_empty() {
                cleaned.push(String::new());
                continue;
            }
            let text = retry_with_backoff(&self.retry, "cleanup", classify_provider_error, || {
                self.cleanup.clean(text)
            })
            .map_err(|e| StageFailure::provider(Stage::Cleaning, e))?;
            cleaned.push(text);
        }

        tracing::debug!("{}: {}", item.id, Stage::CacheWriting);
        let text = assemble_text(&cleaned);
        let artifact = self
            .cache
            .put(&item.id, &item.version, &text, &pages)
            .map_err(|e| StageFailure {
                stage: Stage::CacheWriting,
                kind: FailureKind::Cache,
                message: e.to_string(),
            })?;
        match self.cache.invalidate_stale(&item.id, &item.version) {
            Ok(0) => {}
            Ok(n) => tracing::debug!("{}: dropped {n} stale cache entries", item.id),
            Err(e) => tracing::warn!("{}: stale cache cleanup failed: {e}", item.id),
        }
        Ok(artifact)
    }

    fn publish(&self, entry: &PlanEntry, artifact: &Artifact) -> Outcome {
        tracing::debug!("{}: {}", entry.notebook.id, Stage::Dispatching);
        let unit = PublishUnit {
            notebook_id: entry.notebook.id.clone(),
            version: entry.notebook.version.clone(),
            notebook_name: entry.notebook.name.trim().to_string(),
            title: entry.title.clone(),
            sub_folder: entry.top_level_folder.clone(),
            folder_path: entry.folder_path.clone(),
            text: artifact.text.clone(),
            attachments: artifact.pages.clone(),
        };
        let results = self.dispatcher.dispatch(&unit, &entry.destinations);
        let succeeded = dispatch::succeeded(&results);
        let failed: BTreeMap<DestinationName, String> = results
            .into_iter()
            .filter_map(|(name, r)| r.err().map(|e| (name, e.to_string())))
            .collect();

        if failed.is_empty() {
            Outcome::Committed {
                destinations: succeeded,
            }
        } else if succeeded.is_empty() {
            Outcome::Failed {
                stage: Stage::Dispatching,
                kind: FailureKind::Destination,
                message: failed
                    .iter()
                    .map(|(name, e)| format!("{name}: {e}"))
                    .collect::<Vec<_>>()
                    .join("; "),
            }
        } else {
            Outcome::PartiallyCommitted { succeeded, failed }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_text_is_numbered() {
        let text = assemble_text(&["first\n".to_string(), String::new()]);
        assert_eq!(text, "--- Page 1 ---\nfirst\n\n--- Page 2 ---\n\n\n");
    }

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn summary_counts_outcomes() {
        let report = |outcome| NotebookReport {
            id: NotebookId::from("n"),
            title: "t".into(),
            reason: ProcessReason::NeverSynced,
            cache_hit: false,
            outcome,
        };
        let summary = RunSummary {
            reports: vec![
                report(Outcome::Committed {
                    destinations: BTreeSet::new(),
                }),
                report(Outcome::Failed {
                    stage: Stage::OcrPending,
                    kind: FailureKind::TransientExternal,
                    message: "429".into(),
                }),
                report(Outcome::PartiallyCommitted {
                    succeeded: BTreeSet::new(),
                    failed: BTreeMap::new(),
                }),
            ],
            ..RunSummary::default()
        };
        assert_eq!(summary.committed(), 1);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.partially_committed(), 1);
        assert!(!summary.is_aborted());
    }
}
