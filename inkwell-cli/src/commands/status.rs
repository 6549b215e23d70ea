//! `inkwell status`: what each destination has received.

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use inkwell_core::DestinationName;
use inkwell_sync::artifact_cache::CacheUsage;
use inkwell_sync::{ArtifactCache, StateStore, SyncRecord};

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,

    /// Config file to use instead of ~/.inkwell/config.yaml.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    summary: StatusSummary,
    notebooks: Vec<NotebookStatus>,
}

#[derive(Debug, Serialize)]
struct StatusSummary {
    notebooks: usize,
    enabled_destinations: Vec<String>,
    pending: usize,
    /// Notebooks whose last attempt published nowhere.
    failing: usize,
    updated_at: Option<DateTime<Utc>>,
    cache_entries: usize,
    cache_bytes: u64,
}

#[derive(Debug, Serialize)]
struct NotebookStatus {
    id: String,
    version: String,
    destinations: Vec<String>,
    /// Enabled destinations this version has not reached yet.
    pending: Vec<String>,
    published_at: Option<DateTime<Utc>>,
}

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "notebook")]
    notebook: String,
    #[tabled(rename = "version")]
    version: String,
    #[tabled(rename = "destinations")]
    destinations: String,
    #[tabled(rename = "pending")]
    pending: String,
    #[tabled(rename = "last publish")]
    last_publish: String,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home_dir()?;
        let config = super::load_config(&home, self.config.as_deref())?;
        let state_path = config.state_path(&home);
        let store = StateStore::open(&state_path)
            .with_context(|| format!("failed to read sync state at {}", state_path.display()))?;
        let usage = ArtifactCache::new(config.cache_dir(&home))
            .usage()
            .context("failed to measure artifact cache")?;

        let report = build_report(&store, &config.enabled_destinations(), usage);
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize status JSON")?
            );
        } else {
            print_table(&report);
        }
        Ok(())
    }
}

fn names(set: &BTreeSet<DestinationName>) -> Vec<String> {
    set.iter().map(|d| d.as_str().to_string()).collect()
}

fn notebook_status(
    id: &str,
    record: &SyncRecord,
    enabled: &BTreeSet<DestinationName>,
) -> NotebookStatus {
    let pending: BTreeSet<DestinationName> =
        enabled.difference(&record.destinations).cloned().collect();
    NotebookStatus {
        id: id.to_string(),
        version: record.version.as_str().to_string(),
        destinations: names(&record.destinations),
        pending: names(&pending),
        published_at: record.published_at,
    }
}

fn build_report(
    store: &StateStore,
    enabled: &BTreeSet<DestinationName>,
    usage: CacheUsage,
) -> StatusReport {
    let notebooks: Vec<NotebookStatus> = store
        .records()
        .iter()
        .map(|(id, record)| notebook_status(id.as_str(), record, enabled))
        .collect();
    StatusReport {
        summary: StatusSummary {
            notebooks: notebooks.len(),
            enabled_destinations: names(enabled),
            pending: notebooks.iter().filter(|n| !n.pending.is_empty()).count(),
            failing: store.failures().len(),
            updated_at: store.state().updated_at,
            cache_entries: usage.entries,
            cache_bytes: usage.bytes,
        },
        notebooks,
    }
}

/// `42s ago`, `5m ago`, `3h ago`, `2d ago`.
fn format_age(timestamp: DateTime<Utc>) -> String {
    let secs = Utc::now()
        .signed_duration_since(timestamp)
        .num_seconds()
        .max(0);
    match secs {
        s if s < 60 => format!("{s}s ago"),
        s if s < 3_600 => format!("{}m ago", s / 60),
        s if s < 86_400 => format!("{}h ago", s / 3_600),
        s => format!("{}d ago", s / 86_400),
    }
}

fn format_bytes(bytes: u64) -> String {
    const MIB: u64 = 1024 * 1024;
    if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else {
        format!("{:.1} KiB", bytes as f64 / 1024.0)
    }
}

fn print_table(report: &StatusReport) {
    let s = &report.summary;
    let enabled = if s.enabled_destinations.is_empty() {
        "none".to_string()
    } else {
        s.enabled_destinations.join(", ")
    };
    println!(
        "Inkwell v{} | {} notebooks | destinations: {} | cache: {} entries, {}",
        env!("CARGO_PKG_VERSION"),
        s.notebooks,
        enabled,
        s.cache_entries,
        format_bytes(s.cache_bytes),
    );

    if s.failing > 0 {
        println!(
            "{}",
            format!(
                "{} notebook(s) failed their last attempt; see ~/.inkwell/logs/sync.log.",
                s.failing
            )
            .red()
        );
    }

    if report.notebooks.is_empty() {
        println!("No notebooks synced yet. Run `inkwell sync`.");
        return;
    }

    let rows: Vec<StatusRow> = report
        .notebooks
        .iter()
        .map(|n| StatusRow {
            notebook: n.id.clone(),
            version: n.version.clone(),
            destinations: n.destinations.join(", "),
            pending: n.pending.join(", "),
            last_publish: n.published_at.map(format_age).unwrap_or_else(|| "imported".into()),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    if s.pending > 0 {
        println!(
            "{}",
            format!(
                "{} notebook(s) missing a destination; `inkwell sync` will publish them.",
                s.pending
            )
            .yellow()
        );
    }
}
