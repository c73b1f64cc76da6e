//! Parsing and validation of `cards.toml` project configuration files.
//!
//! This crate reads the project configuration file and produces a strongly-typed
//! [`CardsConfig`] describing the builder cache layout, inline-template policy,
//! and the realms cards are loaded from.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str, CONFIG_FILE};
pub use types::*;
