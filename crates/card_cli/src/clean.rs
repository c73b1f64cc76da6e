//! `cards clean`: remove the cache directory.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::project;

/// Runs the `cards clean` command.
pub fn run(project_dir: &Path) -> Result<()> {
    let config = project::config(project_dir)?;
    let cache_dir = project_dir.join(&config.builder.cache_dir);
    if !cache_dir.exists() {
        info!(cache_dir = %cache_dir.display(), "nothing to clean");
        return Ok(());
    }
    std::fs::remove_dir_all(&cache_dir)
        .with_context(|| format!("failed to remove {}", cache_dir.display()))?;
    eprintln!("     Removed {}", cache_dir.display());
    Ok(())
}
