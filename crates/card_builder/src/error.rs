//! Builder error types.

use std::path::PathBuf;

use card_cache::CacheError;

/// Errors raised by the builder outside of fetching and compiling cards.
#[derive(Debug, thiserror::Error)]
pub enum BuilderError {
    /// The cache directory cannot back a builder.
    #[error("cache directory {path} is not usable: {source}")]
    Packaging {
        /// The configured cache directory.
        path: PathBuf,
        /// Why it was rejected.
        source: CacheError,
    },

    /// A cache or registry operation failed.
    #[error(transparent)]
    Cache(#[from] CacheError),
}
