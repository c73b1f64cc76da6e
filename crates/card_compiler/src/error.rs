//! Error types for fetching and compiling cards.

use std::fmt;
use std::path::PathBuf;

use card_cache::CacheError;
use card_common::{CardUrl, Format, UrlError};
use card_template::TemplateError;

/// Errors reported by a realm while fetching a raw card.
#[derive(Debug, thiserror::Error)]
pub enum RealmError {
    /// The realm has no card at this URL.
    #[error("card not found: {url}")]
    NotFound {
        /// The requested card.
        url: CardUrl,
    },

    /// The bundle names a file that does not exist.
    #[error("card {url} references missing file `{file}`")]
    MissingFile {
        /// The card whose bundle is incomplete.
        url: CardUrl,
        /// The missing file name.
        file: String,
    },

    /// The bundle descriptor is malformed.
    #[error("invalid bundle for card {url}: {reason}")]
    InvalidBundle {
        /// The card whose bundle is malformed.
        url: CardUrl,
        /// What is wrong with it.
        reason: String,
    },

    /// Reading the realm's storage failed.
    #[error("realm I/O error at {path}: {source}")]
    Io {
        /// The path being read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}

/// A chain of card URLs that leads back to its first element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cycle(pub Vec<CardUrl>);

impl fmt::Display for Cycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, url) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{url}")?;
        }
        Ok(())
    }
}

/// Errors produced while compiling a card.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// A realm error, propagated unchanged.
    #[error(transparent)]
    Realm(#[from] RealmError),

    /// The adoption chain revisits a card.
    #[error("cyclic adoption: {cycle}")]
    CyclicAdoption {
        /// The offending chain, ending where it started.
        cycle: Cycle,
    },

    /// Field types lead back to a card that is still being resolved.
    #[error("cyclic field reference: {cycle}")]
    CyclicFieldReference {
        /// The offending chain, ending where it started.
        cycle: Cycle,
    },

    /// Neither the card nor any ancestor defines a required format.
    #[error("card {url} has no `{format}` template and inherits none")]
    MissingFormat {
        /// The card being compiled.
        url: CardUrl,
        /// The unresolvable format.
        format: Format,
    },

    /// The schema source is malformed.
    #[error("schema of {url} is invalid at byte {offset}: {message}")]
    Schema {
        /// The card being compiled.
        url: CardUrl,
        /// What went wrong.
        message: String,
        /// Byte offset into the schema source.
        offset: usize,
    },

    /// A field's type is not an imported card.
    #[error("field `{field}` of {url} has unknown type `{ident}`")]
    UnknownFieldType {
        /// The card being compiled.
        url: CardUrl,
        /// The field name.
        field: String,
        /// The type identifier used in the decorator.
        ident: String,
    },

    /// A template failed to parse or transform.
    #[error("`{format}` template of {url} is invalid: {source}")]
    Template {
        /// The card being compiled.
        url: CardUrl,
        /// The format whose template failed.
        format: Format,
        /// The underlying template error.
        #[source]
        source: TemplateError,
    },

    /// A card reference is not a valid URL.
    #[error(transparent)]
    Url(#[from] UrlError),

    /// The module registry refused a module.
    #[error("failed to define module: {source}")]
    Define {
        /// The registry error.
        #[from]
        source: CacheError,
    },

    /// Serializing generated code failed.
    #[error("code generation failed: {reason}")]
    Codegen {
        /// Description of the failure.
        reason: String,
    },
}

impl CompileError {
    /// Returns `true` if the error is a missing card.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CompileError::Realm(RealmError::NotFound { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> CardUrl {
        CardUrl::parse(s).unwrap()
    }

    #[test]
    fn not_found_is_transparent() {
        let err = CompileError::from(RealmError::NotFound {
            url: url("https://demo.com/missing"),
        });
        assert_eq!(err.to_string(), "card not found: https://demo.com/missing");
        assert!(err.is_not_found());
    }

    #[test]
    fn cycle_display_names_every_card() {
        let err = CompileError::CyclicAdoption {
            cycle: Cycle(vec![
                url("https://demo.com/a"),
                url("https://demo.com/b"),
                url("https://demo.com/a"),
            ]),
        };
        assert_eq!(
            err.to_string(),
            "cyclic adoption: https://demo.com/a -> https://demo.com/b -> https://demo.com/a"
        );
        assert!(!err.is_not_found());
    }

    #[test]
    fn missing_format_display() {
        let err = CompileError::MissingFormat {
            url: url("https://demo.com/post"),
            format: Format::Embedded,
        };
        assert_eq!(
            err.to_string(),
            "card https://demo.com/post has no `embedded` template and inherits none"
        );
    }

    #[test]
    fn template_error_keeps_source() {
        let err = CompileError::Template {
            url: url("https://demo.com/post"),
            format: Format::Isolated,
            source: TemplateError::syntax("unclosed element <h1>", 0),
        };
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("unclosed element"));
    }
}
