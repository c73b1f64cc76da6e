//! Storage for raw and compiled cards, and the module registries compiled
//! cards are defined into.
//!
//! [`CacheStore`] is the capability the builder caches sit behind; it has an
//! in-memory implementation ([`MemoryCache`]) and a persistent one
//! ([`DiskCache`]) keyed by the card URL identity codec. [`ModuleRegistry`]
//! is the injected `define`/`undefine` capability, again with in-memory and
//! on-disk implementations. On-disk state lives under a cache directory
//! described by a [`CacheManifest`].

#![warn(missing_docs)]

pub mod artifact;
pub mod disk;
pub mod error;
pub mod manifest;
pub mod modules;
pub mod store;

pub use artifact::ArtifactStore;
pub use disk::DiskCache;
pub use error::CacheError;
pub use manifest::{CacheManifest, MANIFEST_FILE, MANIFEST_FORMAT_VERSION};
pub use modules::{DiskModuleRegistry, InMemoryModuleRegistry, ModuleRegistry};
pub use store::{CacheStore, MemoryCache};
