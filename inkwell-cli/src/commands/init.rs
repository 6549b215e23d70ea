//! `inkwell init`

use anyhow::{Context, Result};
use clap::Args;

use inkwell_core::config;

#[derive(Args, Debug)]
pub struct InitArgs {}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home_dir()?;
        let (path, created) = config::init_at(&home).context("failed to write default config")?;
        if created {
            println!("✓ Wrote default config to {}", path.display());
            println!("  Add your Google Vision and OpenAI keys, then run `inkwell sync --dry-run`.");
        } else {
            println!("· Config already exists at {}", path.display());
        }
        Ok(())
    }
}
