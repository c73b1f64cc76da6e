//! Cache directory manifest.
//!
//! The cache directory doubles as a module package: compiled modules are
//! resolved by the host as `<module_prefix>/<path>`, which only works when
//! the package exports every path. `manifest.json` records that export map
//! together with the prefix and layout version, and is validated before a
//! builder uses the directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// Name of the manifest file within the cache directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Current cache layout version.
pub const MANIFEST_FORMAT_VERSION: u32 = 1;

/// The export pattern every cache package must carry.
const WILDCARD_EXPORT: &str = "./*";

/// Contents of `manifest.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheManifest {
    /// Layout version of the cache directory.
    pub format_version: u32,

    /// Prefix under which compiled modules are imported.
    pub module_prefix: String,

    /// Package export map. Must map `./*` to `./*`.
    pub exports: BTreeMap<String, String>,
}

impl CacheManifest {
    /// Creates a manifest with the wildcard export map.
    pub fn new(module_prefix: &str) -> Self {
        let mut exports = BTreeMap::new();
        exports.insert(WILDCARD_EXPORT.to_string(), WILDCARD_EXPORT.to_string());
        Self {
            format_version: MANIFEST_FORMAT_VERSION,
            module_prefix: module_prefix.to_string(),
            exports,
        }
    }

    /// Returns the manifest path for a cache directory.
    pub fn path(cache_dir: &Path) -> PathBuf {
        cache_dir.join(MANIFEST_FILE)
    }

    /// Loads the manifest, returning `None` if it is missing or unreadable.
    pub fn load(cache_dir: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(Self::path(cache_dir)).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Saves the manifest, creating the cache directory if needed.
    pub fn save(&self, cache_dir: &Path) -> Result<(), CacheError> {
        std::fs::create_dir_all(cache_dir).map_err(|e| CacheError::io(cache_dir, e))?;
        let path = Self::path(cache_dir);
        let json = serde_json::to_string_pretty(self).map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })?;
        std::fs::write(&path, json).map_err(|e| CacheError::io(path, e))
    }

    /// Opens and validates the manifest of an existing cache directory.
    ///
    /// Any problem with the packaging is reported as
    /// [`CacheError::InvalidPackaging`].
    pub fn open(cache_dir: &Path) -> Result<Self, CacheError> {
        let path = Self::path(cache_dir);
        let invalid = |reason: String| CacheError::InvalidPackaging {
            path: path.clone(),
            reason,
        };
        let content = std::fs::read_to_string(&path)
            .map_err(|e| invalid(format!("cannot read manifest: {e}")))?;
        let manifest: CacheManifest = serde_json::from_str(&content)
            .map_err(|e| invalid(format!("malformed manifest: {e}")))?;
        manifest.validate().map_err(invalid)?;
        Ok(manifest)
    }

    /// Opens the manifest in `cache_dir`, writing a fresh one if none exists.
    ///
    /// An existing manifest must be valid and use the same module prefix.
    pub fn init(cache_dir: &Path, module_prefix: &str) -> Result<Self, CacheError> {
        if !Self::path(cache_dir).exists() {
            let manifest = Self::new(module_prefix);
            manifest.save(cache_dir)?;
            return Ok(manifest);
        }
        let manifest = Self::open(cache_dir)?;
        if manifest.module_prefix != module_prefix {
            return Err(CacheError::InvalidPackaging {
                path: Self::path(cache_dir),
                reason: format!(
                    "module prefix `{}` does not match configured `{module_prefix}`",
                    manifest.module_prefix
                ),
            });
        }
        Ok(manifest)
    }

    fn validate(&self) -> Result<(), String> {
        if self.format_version != MANIFEST_FORMAT_VERSION {
            return Err(format!(
                "layout version {} is not supported (expected {MANIFEST_FORMAT_VERSION})",
                self.format_version
            ));
        }
        if self.module_prefix.is_empty() {
            return Err("module prefix is empty".to_string());
        }
        match self.exports.get(WILDCARD_EXPORT) {
            Some(target) if target == WILDCARD_EXPORT => Ok(()),
            Some(target) => Err(format!(
                "exports map `{WILDCARD_EXPORT}` to `{target}`, expected `{WILDCARD_EXPORT}`"
            )),
            None => Err(format!("exports must map `{WILDCARD_EXPORT}` to `{WILDCARD_EXPORT}`")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_manifest_exports_everything() {
        let m = CacheManifest::new("@cards/compiled");
        assert_eq!(m.format_version, MANIFEST_FORMAT_VERSION);
        assert_eq!(m.exports.get("./*").map(String::as_str), Some("./*"));
        assert!(m.validate().is_ok());
    }

    #[test]
    fn save_and_open_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let m = CacheManifest::new("@cards/compiled");
        m.save(dir.path()).unwrap();
        assert_eq!(CacheManifest::open(dir.path()).unwrap(), m);
        assert_eq!(CacheManifest::load(dir.path()).unwrap(), m);
    }

    #[test]
    fn open_missing_manifest_is_invalid_packaging() {
        let dir = tempfile::tempdir().unwrap();
        let err = CacheManifest::open(dir.path()).unwrap_err();
        assert!(matches!(err, CacheError::InvalidPackaging { .. }));
    }

    #[test]
    fn open_corrupt_manifest_is_invalid_packaging() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), "not valid json {{{").unwrap();
        let err = CacheManifest::open(dir.path()).unwrap_err();
        assert!(err.to_string().contains("malformed manifest"));
        assert!(CacheManifest::load(dir.path()).is_none());
    }

    #[test]
    fn open_without_wildcard_export_is_invalid_packaging() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = CacheManifest::new("@cards/compiled");
        m.exports.clear();
        m.exports.insert(".".to_string(), "./index.js".to_string());
        m.save(dir.path()).unwrap();
        let err = CacheManifest::open(dir.path()).unwrap_err();
        assert!(matches!(err, CacheError::InvalidPackaging { ref reason, .. } if reason.contains("exports")));
    }

    #[test]
    fn open_with_wrong_export_target_is_invalid_packaging() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = CacheManifest::new("@cards/compiled");
        m.exports.insert("./*".to_string(), "./dist/*".to_string());
        m.save(dir.path()).unwrap();
        assert!(CacheManifest::open(dir.path()).is_err());
    }

    #[test]
    fn open_future_version_is_invalid_packaging() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = CacheManifest::new("@cards/compiled");
        m.format_version = 99;
        m.save(dir.path()).unwrap();
        let err = CacheManifest::open(dir.path()).unwrap_err();
        assert!(err.to_string().contains("layout version 99"));
    }

    #[test]
    fn init_creates_then_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = dir.path().join("nested").join("cache");
        let created = CacheManifest::init(&cache_dir, "@cards/compiled").unwrap();
        assert!(cache_dir.join(MANIFEST_FILE).exists());
        let reopened = CacheManifest::init(&cache_dir, "@cards/compiled").unwrap();
        assert_eq!(created, reopened);
    }

    #[test]
    fn init_rejects_prefix_change() {
        let dir = tempfile::tempdir().unwrap();
        CacheManifest::init(dir.path(), "@cards/compiled").unwrap();
        let err = CacheManifest::init(dir.path(), "@other/compiled").unwrap_err();
        assert!(matches!(err, CacheError::InvalidPackaging { .. }));
    }
}
