//! Realms: where raw cards come from.
//!
//! The builder treats a realm as opaque. [`FsRealm`] reads card bundles from
//! a directory, [`InMemoryRealm`] serves fixtures, and [`RealmSet`] routes
//! each URL to the first realm that serves it.

use std::collections::{BTreeMap, HashMap};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use card_common::{CardUrl, Format};
use card_compiler::{RawCard, RealmError};
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;
use url::Url;

/// File describing a card bundle inside its directory.
pub const CARD_DESCRIPTOR: &str = "card.json";

/// A source of raw cards.
#[async_trait]
pub trait Realm: Send + Sync {
    /// Returns `true` if cards under `url` belong to this realm.
    fn serves(&self, url: &CardUrl) -> bool;

    /// Fetches the raw source bundle of a card.
    async fn fetch_raw_card(&self, url: &CardUrl) -> Result<RawCard, RealmError>;
}

// ============================================================================
// Filesystem realm
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct CardDescriptor {
    adopts_from: Option<String>,
    schema: Option<String>,
    isolated: Option<String>,
    embedded: Option<String>,
    edit: Option<String>,
    data: Option<Map<String, Value>>,
}

impl CardDescriptor {
    fn formats(&self) -> [(Format, Option<&String>); 3] {
        [
            (Format::Isolated, self.isolated.as_ref()),
            (Format::Embedded, self.embedded.as_ref()),
            (Format::Edit, self.edit.as_ref()),
        ]
    }
}

/// A realm rooted at a base URL and backed by a directory.
///
/// Card `<base>/<path>` is described by `<dir>/<path>/card.json`. Files the
/// descriptor names are read into the matching slots; every other file in
/// the card directory travels along in [`RawCard::files`].
#[derive(Debug, Clone)]
pub struct FsRealm {
    base: Url,
    dir: PathBuf,
}

impl FsRealm {
    /// Creates a realm serving `base` from `dir`.
    pub fn new(base: Url, dir: impl Into<PathBuf>) -> Self {
        Self {
            base,
            dir: dir.into(),
        }
    }

    /// Returns the base URL.
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Returns the directory of a card, or `None` if `url` is outside the
    /// realm or names no plain relative path once percent-decoded.
    pub fn card_dir(&self, url: &CardUrl) -> Option<PathBuf> {
        let encoded = url.relative_to(&self.base)?;
        let relative = urlencoding::decode(&encoded).ok()?;
        let path = Path::new(relative.as_ref());
        let plain = !relative.is_empty()
            && path.components().all(|c| matches!(c, Component::Normal(_)));
        plain.then(|| self.dir.join(path))
    }
}

fn io_error(path: &Path, source: std::io::Error) -> RealmError {
    RealmError::Io {
        path: path.to_path_buf(),
        source,
    }
}

async fn read_bundle_files(dir: &Path) -> Result<BTreeMap<String, String>, RealmError> {
    let mut files = BTreeMap::new();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| io_error(dir, e))?;
    while let Some(entry) = entries.next_entry().await.map_err(|e| io_error(dir, e))? {
        let path = entry.path();
        let is_file = entry
            .file_type()
            .await
            .map_err(|e| io_error(&path, e))?
            .is_file();
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if !is_file || name == CARD_DESCRIPTOR {
            continue;
        }
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                files.insert(name, content);
            }
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                debug!(path = %path.display(), "skipping non-UTF-8 bundle file");
            }
            Err(e) => return Err(io_error(&path, e)),
        }
    }
    Ok(files)
}

#[async_trait]
impl Realm for FsRealm {
    fn serves(&self, url: &CardUrl) -> bool {
        url.as_str().starts_with(self.base.as_str())
    }

    async fn fetch_raw_card(&self, url: &CardUrl) -> Result<RawCard, RealmError> {
        let not_found = || RealmError::NotFound { url: url.clone() };
        let dir = self.card_dir(url).ok_or_else(not_found)?;
        let descriptor_path = dir.join(CARD_DESCRIPTOR);

        let text = match tokio::fs::read_to_string(&descriptor_path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(io_error(&descriptor_path, e)),
        };
        let descriptor: CardDescriptor =
            serde_json::from_str(&text).map_err(|e| RealmError::InvalidBundle {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        let files = read_bundle_files(&dir).await?;
        let lookup = |name: &String| {
            files.get(name).cloned().ok_or_else(|| RealmError::MissingFile {
                url: url.clone(),
                file: name.clone(),
            })
        };

        let mut raw = RawCard::new(url.clone());
        raw.adopts_from = descriptor.adopts_from.clone();
        raw.schema_source = descriptor.schema.as_ref().map(&lookup).transpose()?;
        for (format, file) in descriptor.formats() {
            if let Some(file) = file {
                raw.format_sources.insert(format, lookup(file)?);
            }
        }
        raw.data = descriptor.data;
        raw.files = files;
        debug!(card = %url, files = raw.files.len(), "read card bundle");
        Ok(raw)
    }
}

// ============================================================================
// In-memory realm
// ============================================================================

/// A fixture realm holding raw cards in memory.
#[derive(Debug, Default)]
pub struct InMemoryRealm {
    cards: RwLock<HashMap<CardUrl, RawCard>>,
    fetches: AtomicUsize,
    latency: Option<Duration>,
}

impl InMemoryRealm {
    /// Creates an empty realm.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a realm holding `cards`.
    pub fn with_cards(cards: impl IntoIterator<Item = RawCard>) -> Self {
        let realm = Self::new();
        for card in cards {
            realm.insert(card);
        }
        realm
    }

    /// Delays every fetch by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Adds or replaces a card.
    pub fn insert(&self, card: RawCard) {
        self.cards.write().insert(card.url.clone(), card);
    }

    /// Removes a card.
    pub fn remove(&self, url: &CardUrl) -> Option<RawCard> {
        self.cards.write().remove(url)
    }

    /// Returns how many fetches the realm has served, failed ones included.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Realm for InMemoryRealm {
    fn serves(&self, _url: &CardUrl) -> bool {
        true
    }

    async fn fetch_raw_card(&self, url: &CardUrl) -> Result<RawCard, RealmError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.cards
            .read()
            .get(url)
            .cloned()
            .ok_or_else(|| RealmError::NotFound { url: url.clone() })
    }
}

// ============================================================================
// Routing
// ============================================================================

/// Several realms, consulted in order.
#[derive(Default)]
pub struct RealmSet {
    realms: Vec<Arc<dyn Realm>>,
}

impl RealmSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a realm.
    pub fn push(&mut self, realm: Arc<dyn Realm>) {
        self.realms.push(realm);
    }

    /// Returns the number of realms.
    pub fn len(&self) -> usize {
        self.realms.len()
    }

    /// Returns `true` if the set holds no realm.
    pub fn is_empty(&self) -> bool {
        self.realms.is_empty()
    }
}

#[async_trait]
impl Realm for RealmSet {
    fn serves(&self, url: &CardUrl) -> bool {
        self.realms.iter().any(|r| r.serves(url))
    }

    async fn fetch_raw_card(&self, url: &CardUrl) -> Result<RawCard, RealmError> {
        match self.realms.iter().find(|r| r.serves(url)) {
            Some(realm) => realm.fetch_raw_card(url).await,
            None => Err(RealmError::NotFound { url: url.clone() }),
        }
    }
}
