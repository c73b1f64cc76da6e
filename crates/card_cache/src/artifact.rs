//! Binary artifact storage.
//!
//! Cached cards are stored as files in subdirectories of the cache, one file
//! per card, named by the card's encoded URL. Each artifact has a header
//! containing magic bytes, format version, and a checksum of the payload.

use std::path::{Path, PathBuf};

use card_common::ContentHash;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CacheError;

/// Magic bytes identifying a card cache artifact.
const ARTIFACT_MAGIC: [u8; 4] = *b"CARD";

/// Current artifact format version. Increment on breaking changes to
/// the header or payload format.
const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// Header prepended to every cached artifact for validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactHeader {
    /// Magic bytes: must be `b"CARD"`.
    pub magic: [u8; 4],

    /// Artifact format version.
    pub format_version: u32,

    /// Content hash of the payload data (for integrity checks).
    pub checksum: ContentHash,
}

/// Store for binary artifacts under a cache directory.
///
/// Each artifact is stored at `<cache_dir>/<subdir>/<key>.<ext>`.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    cache_dir: PathBuf,
}

impl ArtifactStore {
    /// Creates a new artifact store rooted at the given cache directory.
    pub fn new(cache_dir: &Path) -> Self {
        Self {
            cache_dir: cache_dir.to_path_buf(),
        }
    }

    /// Ensures that the subdirectory for the given artifact type exists.
    pub fn ensure_dirs(&self, subdir: &str) -> Result<(), CacheError> {
        let dir = self.cache_dir.join(subdir);
        std::fs::create_dir_all(&dir).map_err(|e| CacheError::io(dir, e))
    }

    /// Returns the file path for an artifact with the given key.
    pub fn artifact_path(&self, subdir: &str, key: &str, ext: &str) -> PathBuf {
        self.cache_dir.join(subdir).join(format!("{key}.{ext}"))
    }

    /// Writes an artifact, replacing any previous artifact with the same key.
    pub fn write_artifact(
        &self,
        subdir: &str,
        key: &str,
        ext: &str,
        data: &[u8],
    ) -> Result<PathBuf, CacheError> {
        self.ensure_dirs(subdir)?;
        let path = self.artifact_path(subdir, key, ext);

        let header = ArtifactHeader {
            magic: ARTIFACT_MAGIC,
            format_version: ARTIFACT_FORMAT_VERSION,
            checksum: ContentHash::from_bytes(data),
        };
        let header_bytes = bincode::serde::encode_to_vec(&header, bincode::config::standard())
            .map_err(|e| CacheError::Serialization {
                reason: e.to_string(),
            })?;

        // 4-byte header length (little-endian) + header + payload
        let header_len = header_bytes.len() as u32;
        let mut output = Vec::with_capacity(4 + header_bytes.len() + data.len());
        output.extend_from_slice(&header_len.to_le_bytes());
        output.extend_from_slice(&header_bytes);
        output.extend_from_slice(data);

        std::fs::write(&path, &output).map_err(|e| CacheError::io(&path, e))?;
        Ok(path)
    }

    /// Reads an artifact's payload, validating its header.
    ///
    /// Returns `None` if the file doesn't exist or fails validation; a
    /// damaged artifact is a cache miss.
    pub fn read_artifact(&self, subdir: &str, key: &str, ext: &str) -> Option<Vec<u8>> {
        let path = self.artifact_path(subdir, key, ext);
        let raw = std::fs::read(&path).ok()?;
        match decode_artifact(&path, &raw) {
            Ok(payload) => Some(payload.to_vec()),
            Err(e) => {
                debug!(error = %e, "discarding cache artifact");
                None
            }
        }
    }

    /// Removes an artifact. Returns `true` if a file was removed.
    pub fn remove_artifact(&self, subdir: &str, key: &str, ext: &str) -> Result<bool, CacheError> {
        let path = self.artifact_path(subdir, key, ext);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::io(path, e)),
        }
    }
}

fn decode_artifact<'a>(path: &Path, raw: &'a [u8]) -> Result<&'a [u8], CacheError> {
    let invalid = |reason: &str| CacheError::InvalidHeader {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    let len_bytes: [u8; 4] = raw
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| invalid("truncated header length"))?;
    let header_len = u32::from_le_bytes(len_bytes) as usize;
    let header_bytes = raw
        .get(4..4 + header_len)
        .ok_or_else(|| invalid("truncated header"))?;

    let (header, _): (ArtifactHeader, usize) =
        bincode::serde::decode_from_slice(header_bytes, bincode::config::standard())
            .map_err(|e| invalid(&e.to_string()))?;

    if header.magic != ARTIFACT_MAGIC {
        return Err(invalid("bad magic bytes"));
    }
    if header.format_version != ARTIFACT_FORMAT_VERSION {
        return Err(CacheError::VersionMismatch {
            path: path.to_path_buf(),
            expected: ARTIFACT_FORMAT_VERSION,
            actual: header.format_version,
        });
    }

    let payload = &raw[4 + header_len..];
    let actual = ContentHash::from_bytes(payload);
    if actual != header.checksum {
        return Err(CacheError::ChecksumMismatch {
            path: path.to_path_buf(),
            expected: header.checksum.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(payload)
}
