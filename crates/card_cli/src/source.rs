//! `cards source`: print a raw card bundle.

use std::path::Path;

use anyhow::Result;

use crate::project;

/// Runs the `cards source` command.
pub async fn run(project_dir: &Path, url: &str) -> Result<()> {
    let url = project::card_url(url)?;
    let builder = project::builder(project_dir)?;
    let raw = builder.get_raw_card(&url).await?;
    println!("{}", serde_json::to_string_pretty(&*raw)?);
    Ok(())
}
