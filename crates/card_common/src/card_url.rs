//! Canonical card URLs and the identity codec that turns them into cache keys.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

/// Errors produced while parsing or resolving a card URL.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UrlError {
    /// The string is not a valid absolute URL.
    #[error("invalid card URL `{input}`: {reason}")]
    Invalid {
        /// The rejected input.
        input: String,
        /// Why the parser rejected it.
        reason: String,
    },

    /// The URL has no hierarchical path (e.g. `mailto:`), so relative
    /// references cannot be resolved against it.
    #[error("card URL `{0}` cannot be used as a base")]
    NotHierarchical(String),
}

/// The canonical identity of a card.
///
/// Query strings and fragments are dropped and a trailing `/` is removed
/// from the path (except for the root path), so `https://demo.com/post/`
/// and `https://demo.com/post` name the same card.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CardUrl(Url);

impl CardUrl {
    /// Parses and canonicalizes an absolute card URL.
    pub fn parse(input: &str) -> Result<Self, UrlError> {
        let url = Url::parse(input).map_err(|e| UrlError::Invalid {
            input: input.to_string(),
            reason: e.to_string(),
        })?;
        Self::from_url(url)
    }

    fn from_url(mut url: Url) -> Result<Self, UrlError> {
        if url.cannot_be_a_base() {
            return Err(UrlError::NotHierarchical(url.to_string()));
        }
        url.set_query(None);
        url.set_fragment(None);
        let path = url.path();
        if path.len() > 1 && path.ends_with('/') {
            let trimmed = path.trim_end_matches('/').to_string();
            let trimmed = if trimmed.is_empty() { "/".to_string() } else { trimmed };
            url.set_path(&trimmed);
        }
        Ok(Self(url))
    }

    /// Resolves `reference` relative to this card.
    ///
    /// The card is treated as a directory: `../post` against
    /// `https://demo.com/post0` is `https://demo.com/post`, and `./author`
    /// is `https://demo.com/post0/author`. Absolute references are returned
    /// canonicalized.
    pub fn join(&self, reference: &str) -> Result<CardUrl, UrlError> {
        let mut base = self.0.clone();
        if !base.path().ends_with('/') {
            let dir = format!("{}/", base.path());
            base.set_path(&dir);
        }
        let joined = base.join(reference).map_err(|e| UrlError::Invalid {
            input: reference.to_string(),
            reason: e.to_string(),
        })?;
        Self::from_url(joined)
    }

    /// Returns the canonical string form.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Returns the underlying parsed URL.
    pub fn as_url(&self) -> &Url {
        &self.0
    }

    /// Returns the path relative to `base` if this card lives under it.
    ///
    /// `base` is expected to be a realm root (ending in `/`).
    pub fn relative_to(&self, base: &Url) -> Option<String> {
        self.as_str()
            .strip_prefix(base.as_str())
            .map(|rest| rest.to_string())
    }

    /// Returns the identity-codec key for this card.
    pub fn cache_key(&self) -> String {
        encode_card_url(self)
    }
}

impl fmt::Display for CardUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for CardUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CardUrl({})", self.as_str())
    }
}

impl TryFrom<String> for CardUrl {
    type Error = UrlError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CardUrl> for String {
    fn from(url: CardUrl) -> Self {
        url.0.into()
    }
}

impl std::str::FromStr for CardUrl {
    type Err = UrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Encodes a card URL into a string usable as a cache key and as a single
/// filesystem path segment.
///
/// Every byte other than ASCII alphanumerics and `-`, `_`, `.`, `~` is
/// percent-encoded, so the result never contains `/` and distinct canonical
/// URLs never collide. The mapping depends only on the canonical URL and is
/// stable across runs.
pub fn encode_card_url(url: &CardUrl) -> String {
    urlencoding::encode(url.as_str()).into_owned()
}
