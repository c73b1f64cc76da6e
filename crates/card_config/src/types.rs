//! Configuration types deserialized from `cards.toml`.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use url::Url;

/// Default cache directory, relative to the project root.
pub const DEFAULT_CACHE_DIR: &str = ".cards-cache";

/// Default prefix of module identifiers handed out by the module registry.
pub const DEFAULT_MODULE_PREFIX: &str = "@cards/compiled";

/// Default maximum size, in bytes, of an embedded template that may be
/// spliced into a consuming template.
pub const DEFAULT_INLINE_THRESHOLD: usize = 256;

/// The top-level project configuration parsed from `cards.toml`.
#[derive(Debug, Serialize, Deserialize)]
pub struct CardsConfig {
    /// Core project metadata.
    pub project: ProjectMeta,
    /// Builder settings (cache layout, inlining policy).
    #[serde(default)]
    pub builder: BuilderConfig,
    /// Named realms mapping a base URL to a directory of cards.
    #[serde(default)]
    pub realms: BTreeMap<String, RealmConfig>,
}

/// Core project metadata required in every `cards.toml`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProjectMeta {
    /// The project name.
    pub name: String,
    /// A brief description of the project.
    #[serde(default)]
    pub description: String,
}

/// Settings for the card builder and its caches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuilderConfig {
    /// Directory holding compiled modules and the cache manifest.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Prefix of every module identifier the registry hands out.
    #[serde(default = "default_module_prefix")]
    pub module_prefix: String,
    /// Largest embedded template (in bytes) eligible for inlining.
    #[serde(default = "default_inline_threshold")]
    pub inline_threshold: usize,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            module_prefix: default_module_prefix(),
            inline_threshold: default_inline_threshold(),
        }
    }
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(DEFAULT_CACHE_DIR)
}

fn default_module_prefix() -> String {
    DEFAULT_MODULE_PREFIX.to_string()
}

fn default_inline_threshold() -> usize {
    DEFAULT_INLINE_THRESHOLD
}

/// A realm: cards under `url` are read from `path`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealmConfig {
    /// Base URL of the realm. Must end with `/`.
    pub url: Url,
    /// Directory holding the realm's cards, relative to the project root.
    pub path: PathBuf,
}
