//! Shared project loading for the subcommands.

use std::path::Path;

use anyhow::{Context, Result};
use card_builder::Builder;
use card_common::CardUrl;
use card_config::{load_config, CardsConfig};

/// Loads `cards.toml` from `project`.
pub fn config(project: &Path) -> Result<CardsConfig> {
    load_config(project)
        .with_context(|| format!("failed to load configuration from {}", project.display()))
}

/// Loads the configuration and opens a builder over it.
pub fn builder(project: &Path) -> Result<Builder> {
    let config = config(project)?;
    Builder::from_config(&config, project).context("run `cards init` to create the cache")
}

/// Parses a card URL argument.
pub fn card_url(input: &str) -> Result<CardUrl> {
    CardUrl::parse(input).with_context(|| format!("`{input}` is not a card URL"))
}
