//! `inkwell cache prune`

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;

use inkwell_core::NotebookId;
use inkwell_sync::{ArtifactCache, StateStore};

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Remove cached artifacts of notebooks that have no sync record.
    Prune {
        /// Config file to use instead of ~/.inkwell/config.yaml.
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
    },
}

pub fn run(command: CacheCommand) -> Result<()> {
    match command {
        CacheCommand::Prune { config } => prune(config),
    }
}

fn prune(config_path: Option<PathBuf>) -> Result<()> {
    let home = super::home_dir()?;
    let config = super::load_config(&home, config_path.as_deref())?;
    let state_path = config.state_path(&home);
    let store = StateStore::open(&state_path)
        .with_context(|| format!("failed to read sync state at {}", state_path.display()))?;

    let keep: BTreeSet<NotebookId> = store.records().keys().cloned().collect();
    let cache = ArtifactCache::new(config.cache_dir(&home));
    let report = cache
        .prune(&keep)
        .with_context(|| format!("failed to prune {}", cache.root().display()))?;

    println!(
        "✓ Pruned cache: {} notebook(s) removed, {} kept",
        report.removed_notebooks, report.kept_notebooks
    );
    Ok(())
}
