//! Module registries: where compiled modules are defined and undefined.
//!
//! A registry turns a [`ModuleSource`] into a loadable unit and names it with
//! a [`ModuleRef`] of the form `<prefix>/<encoded-card-url>/<local-name>`.
//! Defining the same `(card, local name)` twice yields the same reference.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use card_common::{encode_card_url, ContentHash, ModuleRef, ModuleSource};
use parking_lot::RwLock;
use tracing::debug;

use crate::error::CacheError;
use crate::manifest::CacheManifest;

/// The injected `define`/`undefine` capability of the host module system.
pub trait ModuleRegistry: Send + Sync {
    /// Registers a module and returns its reference.
    fn define(&self, module: &ModuleSource) -> Result<ModuleRef, CacheError>;

    /// Removes a module. Undefining an unknown module is a no-op.
    fn undefine(&self, module: &ModuleRef) -> Result<(), CacheError>;

    /// Returns `true` if `module` is currently defined.
    fn is_defined(&self, module: &ModuleRef) -> bool;
}

fn check_local_name(name: &str) -> Result<(), CacheError> {
    let path = Path::new(name);
    let escapes = name.is_empty()
        || path
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
    if escapes {
        return Err(CacheError::InvalidModuleName {
            name: name.to_string(),
        });
    }
    Ok(())
}

fn module_ref(prefix: &str, module: &ModuleSource) -> Result<ModuleRef, CacheError> {
    check_local_name(&module.local_name)?;
    Ok(ModuleRef::new(format!(
        "{prefix}/{}/{}",
        encode_card_url(&module.card_url),
        module.local_name
    )))
}

// ============================================================================
// In-memory registry
// ============================================================================

/// A registry that keeps module sources in memory.
#[derive(Debug)]
pub struct InMemoryModuleRegistry {
    prefix: String,
    modules: RwLock<BTreeMap<ModuleRef, ModuleSource>>,
}

impl InMemoryModuleRegistry {
    /// Creates an empty registry issuing references under `prefix`.
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            modules: RwLock::new(BTreeMap::new()),
        }
    }

    /// Returns the source of a defined module.
    pub fn source(&self, module: &ModuleRef) -> Option<ModuleSource> {
        self.modules.read().get(module).cloned()
    }

    /// Returns every defined module reference, in order.
    pub fn defined(&self) -> Vec<ModuleRef> {
        self.modules.read().keys().cloned().collect()
    }

    /// Returns the number of defined modules.
    pub fn len(&self) -> usize {
        self.modules.read().len()
    }

    /// Returns `true` if no module is defined.
    pub fn is_empty(&self) -> bool {
        self.modules.read().is_empty()
    }
}

impl ModuleRegistry for InMemoryModuleRegistry {
    fn define(&self, module: &ModuleSource) -> Result<ModuleRef, CacheError> {
        let id = module_ref(&self.prefix, module)?;
        self.modules.write().insert(id.clone(), module.clone());
        Ok(id)
    }

    fn undefine(&self, module: &ModuleRef) -> Result<(), CacheError> {
        self.modules.write().remove(module);
        Ok(())
    }

    fn is_defined(&self, module: &ModuleRef) -> bool {
        self.modules.read().contains_key(module)
    }
}

// ============================================================================
// On-disk registry
// ============================================================================

/// A registry writing module files into a validated cache directory at
/// `<cache_dir>/<encoded-card-url>/<local-name>`.
#[derive(Debug)]
pub struct DiskModuleRegistry {
    root: PathBuf,
    prefix: String,
}

impl DiskModuleRegistry {
    /// Opens a registry over an existing cache directory.
    ///
    /// Fails with [`CacheError::InvalidPackaging`] unless the directory holds
    /// a valid manifest.
    pub fn open(cache_dir: &Path) -> Result<Self, CacheError> {
        let manifest = CacheManifest::open(cache_dir)?;
        Ok(Self {
            root: cache_dir.to_path_buf(),
            prefix: manifest.module_prefix,
        })
    }

    /// Returns the module prefix recorded in the manifest.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the file backing a module reference.
    pub fn module_path(&self, module: &ModuleRef) -> Result<PathBuf, CacheError> {
        let relative = module
            .as_str()
            .strip_prefix(&self.prefix)
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(|| CacheError::ForeignModule {
                module: module.to_string(),
            })?;
        check_local_name(relative)?;
        Ok(self.root.join(relative))
    }

    /// Reads the source of a defined module.
    pub fn source(&self, module: &ModuleRef) -> Result<String, CacheError> {
        let path = self.module_path(module)?;
        std::fs::read_to_string(&path).map_err(|e| CacheError::io(path, e))
    }
}

impl ModuleRegistry for DiskModuleRegistry {
    fn define(&self, module: &ModuleSource) -> Result<ModuleRef, CacheError> {
        let id = module_ref(&self.prefix, module)?;
        let path = self.module_path(&id)?;

        if let Ok(existing) = std::fs::read(&path) {
            if ContentHash::from_bytes(&existing) == ContentHash::from_bytes(module.source.as_bytes())
            {
                debug!(module = %id, "module already defined");
                return Ok(id);
            }
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;
        }
        std::fs::write(&path, &module.source).map_err(|e| CacheError::io(&path, e))?;
        Ok(id)
    }

    fn undefine(&self, module: &ModuleRef) -> Result<(), CacheError> {
        let path = self.module_path(module)?;
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(CacheError::io(path, e)),
        }

        // Prune now-empty directories up to the cache root.
        let mut dir = path.parent();
        while let Some(d) = dir {
            if d == self.root || std::fs::remove_dir(d).is_err() {
                break;
            }
            dir = d.parent();
        }
        Ok(())
    }

    fn is_defined(&self, module: &ModuleRef) -> bool {
        self.module_path(module).map(|p| p.is_file()).unwrap_or(false)
    }
}
