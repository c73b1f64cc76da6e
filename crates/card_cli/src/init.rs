//! `cards init`: project scaffolding command.
//!
//! Creates a project directory with a `cards.toml`, an empty `cards/` realm
//! directory and an initialized module cache.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use card_cache::CacheManifest;
use card_config::{
    load_config_from_str, CONFIG_FILE, DEFAULT_CACHE_DIR, DEFAULT_INLINE_THRESHOLD,
    DEFAULT_MODULE_PREFIX,
};

/// Realm URL written by `cards init` unless another is given.
pub const DEFAULT_REALM_URL: &str = "https://cards.local/";

const REALM_DIR: &str = "cards";

/// Runs the `cards init` command.
///
/// If `name` is `Some`, creates a new subdirectory of `parent` with that
/// name. Otherwise initializes `parent` itself.
pub fn run(parent: &Path, name: Option<&str>, realm_url: &str) -> Result<()> {
    let project_dir = match name {
        Some(n) => {
            let dir = parent.join(n);
            if dir.exists() {
                bail!("directory '{}' already exists", dir.display());
            }
            dir
        }
        None => parent.to_path_buf(),
    };
    let config_path = project_dir.join(CONFIG_FILE);
    if config_path.exists() {
        bail!("{} already exists", config_path.display());
    }

    let project_name = name
        .map(str::to_string)
        .or_else(|| {
            project_dir
                .canonicalize()
                .ok()
                .and_then(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_string))
        })
        .unwrap_or_else(|| "cards".to_string());

    let toml = config_toml(&project_name, realm_url);
    // Refuse to write a configuration that would not load back.
    let config = load_config_from_str(&toml).context("invalid project settings")?;

    eprintln!("  Creating card project `{project_name}`");
    let realm_dir: PathBuf = project_dir.join(REALM_DIR);
    fs::create_dir_all(&realm_dir)
        .with_context(|| format!("failed to create {}", realm_dir.display()))?;
    fs::write(&config_path, toml)
        .with_context(|| format!("failed to write {}", config_path.display()))?;

    let cache_dir = project_dir.join(&config.builder.cache_dir);
    CacheManifest::init(&cache_dir, &config.builder.module_prefix)?;

    eprintln!("     Created {}", config_path.display());
    eprintln!("     Created {}", realm_dir.display());
    eprintln!("     Created {}", CacheManifest::path(&cache_dir).display());
    Ok(())
}

fn config_toml(name: &str, realm_url: &str) -> String {
    format!(
        r#"[project]
name = "{name}"

[builder]
cache_dir = "{DEFAULT_CACHE_DIR}"
module_prefix = "{DEFAULT_MODULE_PREFIX}"
inline_threshold = {DEFAULT_INLINE_THRESHOLD}

[realms.local]
url = "{realm_url}"
path = "{REALM_DIR}"
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use card_config::load_config;

    #[test]
    fn init_creates_project_layout() {
        let tmp = tempfile::tempdir().unwrap();
        run(tmp.path(), Some("blog"), DEFAULT_REALM_URL).unwrap();

        let root = tmp.path().join("blog");
        assert!(root.join(CONFIG_FILE).is_file());
        assert!(root.join(REALM_DIR).is_dir());
        assert!(CacheManifest::open(&root.join(DEFAULT_CACHE_DIR)).is_ok());

        let config = load_config(&root).unwrap();
        assert_eq!(config.project.name, "blog");
        assert_eq!(config.realms["local"].url.as_str(), DEFAULT_REALM_URL);
        assert_eq!(config.realms["local"].path, PathBuf::from(REALM_DIR));
    }

    #[test]
    fn init_in_place_uses_directory_name() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("site");
        fs::create_dir_all(&dir).unwrap();
        run(&dir, None, "https://demo.com/").unwrap();
        let config = load_config(&dir).unwrap();
        assert_eq!(config.project.name, "site");
        assert_eq!(config.realms["local"].url.as_str(), "https://demo.com/");
    }

    #[test]
    fn init_existing_dir_error() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("blog")).unwrap();
        assert!(run(tmp.path(), Some("blog"), DEFAULT_REALM_URL).is_err());
    }

    #[test]
    fn init_twice_in_place_fails() {
        let tmp = tempfile::tempdir().unwrap();
        run(tmp.path(), None, DEFAULT_REALM_URL).unwrap();
        assert!(run(tmp.path(), None, DEFAULT_REALM_URL).is_err());
    }

    #[test]
    fn init_rejects_realm_url_without_trailing_slash() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(run(tmp.path(), None, "https://demo.com/cards").is_err());
        assert!(!tmp.path().join(CONFIG_FILE).exists());
    }
}
