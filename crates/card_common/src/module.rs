//! Module descriptors handed from the compiler to a module registry.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::card_url::CardUrl;

/// A stable identifier of a defined module, as returned by a registry.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleRef(String);

impl ModuleRef {
    /// Wraps a module identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ModuleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModuleRef({})", self.0)
    }
}

/// Content type of an emitted module.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum ContentType {
    /// A JavaScript module (schema classes and format components).
    #[serde(rename = "application/javascript")]
    JavaScript,
    /// A stylesheet asset.
    #[serde(rename = "text/css")]
    Css,
}

impl ContentType {
    /// Returns the MIME type string.
    pub fn as_mime(self) -> &'static str {
        match self {
            ContentType::JavaScript => "application/javascript",
            ContentType::Css => "text/css",
        }
    }
}

/// An in-memory module produced by the compiler.
///
/// The `(card_url, local_name)` pair identifies the module; the registry
/// decides how to turn it into a loadable unit and which [`ModuleRef`] names
/// it.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct ModuleSource {
    /// The card that owns the module.
    pub card_url: CardUrl,
    /// File-like name of the module within its card (e.g. `embedded.js`).
    pub local_name: String,
    /// What kind of source this is.
    pub content_type: ContentType,
    /// The generated source text.
    pub source: String,
}

impl ModuleSource {
    /// Creates a JavaScript module descriptor.
    pub fn javascript(card_url: CardUrl, local_name: impl Into<String>, source: String) -> Self {
        Self {
            card_url,
            local_name: local_name.into(),
            content_type: ContentType::JavaScript,
            source,
        }
    }

    /// Creates a CSS asset descriptor.
    pub fn css(card_url: CardUrl, local_name: impl Into<String>, source: String) -> Self {
        Self {
            card_url,
            local_name: local_name.into(),
            content_type: ContentType::Css,
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_serializes_as_mime() {
        let json = serde_json::to_string(&ContentType::Css).unwrap();
        assert_eq!(json, "\"text/css\"");
        assert_eq!(ContentType::JavaScript.as_mime(), "application/javascript");
    }

    #[test]
    fn module_ref_is_transparent() {
        let r = ModuleRef::new("@cards/compiled/x/schema.js");
        assert_eq!(
            serde_json::to_string(&r).unwrap(),
            "\"@cards/compiled/x/schema.js\""
        );
        assert_eq!(r.to_string(), "@cards/compiled/x/schema.js");
    }

    #[test]
    fn constructors_set_content_type() {
        let url = CardUrl::parse("https://demo.com/post").unwrap();
        let js = ModuleSource::javascript(url.clone(), "schema.js", String::new());
        let css = ModuleSource::css(url, "style.css", String::new());
        assert_eq!(js.content_type, ContentType::JavaScript);
        assert_eq!(css.content_type, ContentType::Css);
    }
}
