//! Card data model: raw sources in, compiled artifacts out.

use std::collections::BTreeMap;
use std::sync::Arc;

use card_common::{CardUrl, Format, ModuleRef, UrlError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The uncompiled source bundle of a card, as supplied by a realm.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCard {
    /// Canonical identity of the card.
    pub url: CardUrl,
    /// Reference to the parent card as written, relative to `url`.
    pub adopts_from: Option<String>,
    /// Schema class source.
    pub schema_source: Option<String>,
    /// Template source per format. A missing entry means the card does not
    /// define that format itself.
    pub format_sources: BTreeMap<Format, String>,
    /// Static field values.
    pub data: Option<Map<String, Value>>,
    /// Every file of the bundle by name.
    pub files: BTreeMap<String, String>,
}

impl RawCard {
    /// Creates an empty raw card.
    pub fn new(url: CardUrl) -> Self {
        Self {
            url,
            adopts_from: None,
            schema_source: None,
            format_sources: BTreeMap::new(),
            data: None,
            files: BTreeMap::new(),
        }
    }

    /// Sets the parent reference.
    pub fn adopting(mut self, parent: impl Into<String>) -> Self {
        self.adopts_from = Some(parent.into());
        self
    }

    /// Sets the schema source.
    pub fn with_schema(mut self, source: impl Into<String>) -> Self {
        self.schema_source = Some(source.into());
        self
    }

    /// Sets the template of one format.
    pub fn with_template(mut self, format: Format, source: impl Into<String>) -> Self {
        self.format_sources.insert(format, source.into());
        self
    }

    /// Sets one data value.
    pub fn with_data(mut self, key: &str, value: Value) -> Self {
        self.data
            .get_or_insert_with(Map::new)
            .insert(key.to_string(), value);
        self
    }

    /// Adds a bundle file.
    pub fn with_file(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.files.insert(name.into(), source.into());
        self
    }

    /// Resolves `adopts_from` against the card URL.
    pub fn parent_url(&self) -> Result<Option<CardUrl>, UrlError> {
        self.adopts_from
            .as_deref()
            .map(|reference| self.url.join(reference))
            .transpose()
    }

    /// Returns the card's own template for `format`.
    pub fn template(&self, format: Format) -> Option<&str> {
        self.format_sources.get(&format).map(String::as_str)
    }
}

/// Whether a field holds one card or a list of cards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arity {
    /// `@contains`.
    Single,
    /// `@containsMany`.
    Plural,
}

/// A field declared by a schema.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSpec {
    /// Name of the field on the model.
    pub local_name: String,
    /// The card describing the field's type.
    pub field_card_url: CardUrl,
    /// One value or many.
    pub arity: Arity,
    /// Computed fields derive their value instead of storing it.
    pub is_computed: bool,
}

/// A field spec together with its field card, compiled.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResolvedField {
    /// The declaration.
    #[serde(flatten)]
    pub spec: FieldSpec,
    /// The compiled field card.
    pub card: Arc<CompiledCard>,
}

/// How one format of a compiled card renders.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentInfo {
    /// The component module.
    pub module_name: ModuleRef,
    /// Fields the template references, in first-use order.
    pub used_fields: Vec<String>,
    /// Template to splice into consumers instead of invoking the component.
    pub inline_template_source: Option<String>,
}

/// The resolved, transformed and registered form of a card.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledCard {
    /// Canonical identity of the card.
    pub url: CardUrl,
    /// The schema class module.
    pub schema_module: ModuleRef,
    /// Own and inherited fields, own entries winning.
    pub fields: BTreeMap<String, ResolvedField>,
    /// The compiled parent card.
    pub adopts_from: Option<Arc<CompiledCard>>,
    /// Component per format, defined locally or inherited.
    pub per_format: BTreeMap<Format, ComponentInfo>,
    /// Static field values.
    pub data: Option<Map<String, Value>>,
    /// Asset modules (stylesheets).
    pub assets: Vec<ModuleRef>,
    /// Modules defined by compiling this card, excluding inherited ones.
    pub modules: Vec<ModuleRef>,
}

impl CompiledCard {
    /// Returns the component of `format`, if any.
    pub fn component(&self, format: Format) -> Option<&ComponentInfo> {
        self.per_format.get(&format)
    }

    /// Returns the names of all fields.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Returns the chain of ancestors, nearest first.
    pub fn ancestors(&self) -> impl Iterator<Item = &CompiledCard> {
        std::iter::successors(self.adopts_from.as_deref(), |card| {
            card.adopts_from.as_deref()
        })
    }
}
