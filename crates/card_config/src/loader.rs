//! Configuration file loading and validation.

use std::collections::BTreeSet;
use std::path::Path;

use crate::error::ConfigError;
use crate::types::CardsConfig;

/// Name of the configuration file at the project root.
pub const CONFIG_FILE: &str = "cards.toml";

/// Loads and validates a `cards.toml` configuration from a project directory.
///
/// Reads `<project_dir>/cards.toml`, parses it, and validates required fields.
pub fn load_config(project_dir: &Path) -> Result<CardsConfig, ConfigError> {
    let config_path = project_dir.join(CONFIG_FILE);
    let content = std::fs::read_to_string(&config_path)?;
    load_config_from_str(&content)
}

/// Parses and validates a `cards.toml` configuration from a string.
///
/// Useful for testing without filesystem dependencies.
pub fn load_config_from_str(content: &str) -> Result<CardsConfig, ConfigError> {
    let config: CardsConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Validates that required fields are present and configuration values are consistent.
fn validate_config(config: &CardsConfig) -> Result<(), ConfigError> {
    if config.project.name.is_empty() {
        return Err(ConfigError::MissingField("project.name".to_string()));
    }
    if config.builder.inline_threshold == 0 {
        return Err(ConfigError::ValidationError(
            "builder.inline_threshold must be greater than zero".to_string(),
        ));
    }
    if config.builder.module_prefix.is_empty() {
        return Err(ConfigError::MissingField("builder.module_prefix".to_string()));
    }

    let mut seen = BTreeSet::new();
    for (name, realm) in &config.realms {
        if realm.url.cannot_be_a_base() || !realm.url.path().ends_with('/') {
            return Err(ConfigError::ValidationError(format!(
                "realm `{name}`: url `{}` must be a base URL ending with `/`",
                realm.url
            )));
        }
        if !seen.insert(realm.url.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "realm `{name}`: url `{}` is served by another realm",
                realm.url
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DEFAULT_CACHE_DIR, DEFAULT_INLINE_THRESHOLD, DEFAULT_MODULE_PREFIX};
    use std::path::PathBuf;

    #[test]
    fn parse_minimal_config() {
        let toml = r#"
[project]
name = "blog"
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.project.name, "blog");
        assert_eq!(config.builder.cache_dir, PathBuf::from(DEFAULT_CACHE_DIR));
        assert_eq!(config.builder.module_prefix, DEFAULT_MODULE_PREFIX);
        assert_eq!(config.builder.inline_threshold, DEFAULT_INLINE_THRESHOLD);
        assert!(config.realms.is_empty());
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
[project]
name = "blog"
description = "Demo realm"

[builder]
cache_dir = "build/cache"
module_prefix = "@blog/compiled"
inline_threshold = 64

[realms.demo]
url = "https://demo.com/"
path = "cards"

[realms.base]
url = "https://cardstack.com/base/"
path = "base"
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.builder.cache_dir, PathBuf::from("build/cache"));
        assert_eq!(config.builder.module_prefix, "@blog/compiled");
        assert_eq!(config.builder.inline_threshold, 64);
        assert_eq!(config.realms.len(), 2);
        assert_eq!(config.realms["demo"].url.as_str(), "https://demo.com/");
        assert_eq!(config.realms["base"].path, PathBuf::from("base"));
    }

    #[test]
    fn missing_name_errors() {
        let toml = r#"
[project]
name = ""
"#;
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(_)));
    }

    #[test]
    fn zero_inline_threshold_errors() {
        let toml = r#"
[project]
name = "blog"

[builder]
inline_threshold = 0
"#;
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn realm_url_without_trailing_slash_errors() {
        let toml = r#"
[project]
name = "blog"

[realms.demo]
url = "https://demo.com/cards"
path = "cards"
"#;
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn duplicate_realm_url_errors() {
        let toml = r#"
[project]
name = "blog"

[realms.a]
url = "https://demo.com/"
path = "a"

[realms.b]
url = "https://demo.com/"
path = "b"
"#;
        let err = load_config_from_str(toml).unwrap_err();
        assert!(err.to_string().contains("another realm"));
    }

    #[test]
    fn invalid_toml_errors() {
        let err = load_config_from_str("this is not valid toml {{{}}}").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "[project]\nname = \"blog\"\n").unwrap();
        let config = load_config(dir.path()).unwrap();
        assert_eq!(config.project.name, "blog");
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }
}
