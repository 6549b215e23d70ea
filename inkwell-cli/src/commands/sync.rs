//! `inkwell sync`: recognize changed notebooks and publish them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use inkwell_core::config::Validation;
use inkwell_core::{paths, Config, DestinationName};
use inkwell_render::Renderer;
use inkwell_sync::destinations::{AppleNotesDestination, ObsidianDestination};
use inkwell_sync::pipeline::NotebookReport;
use inkwell_sync::planner::SkipReason;
use inkwell_sync::providers::{CleanupProvider, PassthroughCleanup};
use inkwell_sync::retry::RetryConfig;
use inkwell_sync::{
    ArtifactCache, Dispatcher, Outcome, Pipeline, PlanOptions, RunSummary, StateStore,
};

use crate::logging;
use crate::providers::{ExportSource, GoogleVisionOcr, OpenAiCleanup, PageDirRenderer};

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Process at most this many notebooks (overrides `sync.max_notebooks_per_run`; 0 = unlimited).
    #[arg(long)]
    pub limit: Option<usize>,

    /// Only this notebook, by name or id. Republished everywhere if already up to date.
    #[arg(long)]
    pub notebook: Option<String>,

    /// Republish every candidate to every enabled destination.
    #[arg(long)]
    pub force: bool,

    /// Show the plan without calling any service or writing anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Config file to use instead of ~/.inkwell/config.yaml.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

impl SyncArgs {
    pub fn run(self, verbose: bool) -> Result<()> {
        let home = super::home_dir()?;
        let config = super::load_config(&home, self.config.as_deref())?;

        let log_path = paths::sync_log_path(&home);
        logging::rotate_sync_log(&log_path);
        logging::init_tracing(verbose, Some(&log_path));

        let mode = if self.dry_run {
            Validation::DryRun
        } else {
            Validation::Full
        };
        config
            .validate(mode)
            .context("configuration is not ready for sync; edit ~/.inkwell/config.yaml")?;

        let pipeline = build_pipeline(&config, &home, self.dry_run)?;
        let mut options = PlanOptions::from_config(&config);
        if let Some(limit) = self.limit {
            options.max_notebooks_per_run = limit;
        }
        options.only_notebook = self.notebook.clone();
        options.force = self.force;

        let state_path = config.state_path(&home);
        let mut store = StateStore::open(&state_path)
            .with_context(|| format!("failed to open sync state at {}", state_path.display()))?;
        tracing::info!(
            "sync starting: {} record(s), destinations: {}",
            store.len(),
            join_names(&options.enabled)
        );

        let summary = pipeline
            .run(&mut store, &options, self.dry_run)
            .context("sync failed")?;

        if summary.dry_run {
            print_plan(&summary);
        } else {
            print_reports(&summary, verbose);
        }

        if let Some(reason) = &summary.aborted {
            bail!("run aborted, no further notebooks were processed: {reason}");
        }
        Ok(())
    }
}

fn build_pipeline(config: &Config, home: &Path, dry_run: bool) -> Result<Pipeline> {
    let templates = paths::inkwell_root(home).join("templates");
    let renderer = if templates.is_dir() {
        Renderer::with_templates(&templates)
    } else {
        Renderer::new()
    }
    .context("failed to load note templates")?;
    let renderer = Arc::new(renderer);

    let mut dispatcher = Dispatcher::new();
    // A dry run never publishes, so destinations need not be reachable.
    if !dry_run {
        if config.apple_notes.enabled {
            dispatcher.register(Box::new(AppleNotesDestination::new(
                &config.apple_notes,
                Arc::clone(&renderer),
            )));
        }
        if let Some(vault) = config.vault_path(home).filter(|_| config.obsidian.enabled) {
            let obsidian = ObsidianDestination::new(
                &vault,
                &config.obsidian.attachments_folder,
                Arc::clone(&renderer),
            )
            .context("cannot publish to Obsidian")?;
            dispatcher.register(Box::new(obsidian));
        }
    }

    let source = ExportSource::new(
        paths::expand_home(&config.source.listing_path, home),
        paths::expand_home(&config.source.pages_dir, home),
    );
    let ocr = GoogleVisionOcr::new(&config.google_vision, config.vision_api_key());
    let cleanup: Box<dyn CleanupProvider> = match config.openai_api_key() {
        Some(key) if config.openai.enabled => {
            let prompt = config
                .openai
                .prompt_path
                .as_deref()
                .map(|p| paths::expand_home(p, home));
            Box::new(OpenAiCleanup::new(&config.openai, key, prompt))
        }
        _ => {
            tracing::info!("text cleanup disabled, publishing raw OCR text");
            Box::new(PassthroughCleanup)
        }
    };

    Ok(Pipeline::new(
        Box::new(source),
        Box::new(PageDirRenderer),
        Box::new(ocr),
        cleanup,
        dispatcher,
        ArtifactCache::new(config.cache_dir(home)),
    )
    .with_retry(RetryConfig::from(&config.retry))
    .with_work_dir(config.work_dir(home))
    .with_workers(config.sync.workers))
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Tabled)]
struct PlanRow {
    #[tabled(rename = "notebook")]
    notebook: String,
    #[tabled(rename = "destinations")]
    destinations: String,
    #[tabled(rename = "reason")]
    reason: String,
}

#[derive(Tabled)]
struct ReportRow {
    #[tabled(rename = "notebook")]
    notebook: String,
    #[tabled(rename = "result")]
    result: String,
    #[tabled(rename = "detail")]
    detail: String,
}

fn join_names<'a>(names: impl IntoIterator<Item = &'a DestinationName>) -> String {
    let joined = names
        .into_iter()
        .map(DestinationName::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if joined.is_empty() {
        "none".to_string()
    } else {
        joined
    }
}

fn print_plan(summary: &RunSummary) {
    if summary.planned.is_empty() {
        println!("[dry-run] ✓ nothing to do");
    } else {
        println!("[dry-run] {} notebook(s) would be processed", summary.planned.len());
        let rows: Vec<PlanRow> = summary
            .planned
            .iter()
            .map(|p| PlanRow {
                notebook: p.title.clone(),
                destinations: join_names(&p.destinations),
                reason: p.reason.to_string(),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
    }
    print_footer(summary);
}

fn report_row(report: &NotebookReport) -> ReportRow {
    let (result, detail) = match &report.outcome {
        Outcome::Committed { destinations } => ("committed", join_names(destinations)),
        Outcome::PartiallyCommitted { succeeded, failed } => {
            let failures = failed
                .iter()
                .map(|(name, e)| format!("{name}: {e}"))
                .collect::<Vec<_>>()
                .join("; ");
            ("partial", format!("ok: {}; failed: {failures}", join_names(succeeded)))
        }
        Outcome::Failed {
            stage,
            kind,
            message,
        } => ("failed", format!("{kind} while {stage}: {message}")),
    };
    let notebook = if report.cache_hit {
        format!("{} (cached)", report.title)
    } else {
        report.title.clone()
    };
    ReportRow {
        notebook,
        result: result.to_string(),
        detail,
    }
}

fn print_reports(summary: &RunSummary, verbose: bool) {
    if summary.reports.is_empty() {
        println!("✓ nothing to do");
    } else {
        let rows: Vec<ReportRow> = summary.reports.iter().map(report_row).collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
    }

    if verbose {
        for s in summary
            .skipped
            .iter()
            .filter(|s| s.reason != SkipReason::UpToDate)
        {
            println!("  ·  skipped {} ({})", s.name, s.reason);
        }
    }
    print_footer(summary);
}

fn print_footer(summary: &RunSummary) {
    let up_to_date = summary
        .skipped
        .iter()
        .filter(|s| s.reason == SkipReason::UpToDate)
        .count();
    let mut parts = Vec::new();
    if !summary.dry_run {
        parts.push(format!("{} committed", summary.committed()).green().to_string());
        if summary.partially_committed() > 0 {
            parts.push(
                format!("{} partial", summary.partially_committed())
                    .yellow()
                    .to_string(),
            );
        }
        if summary.failed() > 0 {
            parts.push(format!("{} failed", summary.failed()).red().to_string());
        }
    }
    parts.push(format!("{up_to_date} up to date"));
    parts.push(format!("{} skipped", summary.skipped.len() - up_to_date));
    if !summary.deferred.is_empty() {
        parts.push(format!("{} deferred to next run", summary.deferred.len()));
    }
    println!("{}", parts.join(" | "));

    if let Some(reason) = &summary.aborted {
        println!("{} {reason}", "aborted:".red().bold());
    }
}
