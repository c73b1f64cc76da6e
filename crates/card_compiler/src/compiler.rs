//! The card compiler.
//!
//! Compilation of one card runs in this order:
//!
//! 1. the card graph reachable from the card is checked for cycles
//! 2. the parent is obtained, compiled, from the host
//! 3. the schema is scanned and every field card is obtained from the host
//! 4. parent fields are merged with own fields, own entries winning
//! 5. the schema module is defined
//! 6. each templated format is transformed and defined, or inherited
//! 7. stylesheet assets are defined
//!
//! The compiler holds no state between compiles. Everything it needs from
//! other cards comes through [`CompileHost`], which is where caching and
//! module ownership live.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use card_common::{CardUrl, Format, ModuleRef, ModuleSource};
use card_template::{print, transform, FieldBinding};
use futures::future::try_join_all;
use tracing::{debug, info, warn};

use crate::ancestry::check_cycles;
use crate::card::{Arity, CompiledCard, ComponentInfo, RawCard, ResolvedField};
use crate::codegen::{component_module, default_schema};
use crate::error::CompileError;
use crate::schema::{parse_schema, resolve_fields, rewrite_imports, ParsedSchema};

/// Local module name of a card's schema class.
pub const SCHEMA_MODULE: &str = "schema.js";

/// Default upper bound, in bytes, for an inlineable embedded template.
pub const DEFAULT_INLINE_THRESHOLD: usize = 256;

/// What the compiler needs from its environment.
#[async_trait]
pub trait CompileHost: Send + Sync {
    /// Returns the raw source of a card.
    async fn raw_card(&self, url: &CardUrl) -> Result<Arc<RawCard>, CompileError>;

    /// Returns a card compiled, compiling it first if necessary.
    async fn compiled_card(&self, url: &CardUrl) -> Result<Arc<CompiledCard>, CompileError>;

    /// Returns `true` if a compiled card for `url` is already available.
    fn is_compiled(&self, url: &CardUrl) -> bool;

    /// Defines a module and returns its reference.
    fn define(&self, module: ModuleSource) -> Result<ModuleRef, CompileError>;
}

/// Compiler tuning.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Printed embedded templates up to this many bytes may be inlined.
    pub inline_threshold: usize,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            inline_threshold: DEFAULT_INLINE_THRESHOLD,
        }
    }
}

/// Compiles raw cards.
#[derive(Clone, Debug, Default)]
pub struct Compiler {
    options: CompilerOptions,
}

impl Compiler {
    /// Creates a compiler with the given options.
    pub fn new(options: CompilerOptions) -> Self {
        Self { options }
    }

    /// Returns the options.
    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// Compiles `raw` against `host`.
    ///
    /// Modules are defined through the host as compilation proceeds. If
    /// compilation fails, modules defined so far remain defined; releasing
    /// them is the host's responsibility.
    pub async fn compile(
        &self,
        host: &dyn CompileHost,
        raw: &RawCard,
    ) -> Result<CompiledCard, CompileError> {
        let url = &raw.url;
        info!(card = %url, "compiling card");

        check_cycles(host, raw).await?;

        let parent = match raw.parent_url()? {
            Some(parent_url) => Some(host.compiled_card(&parent_url).await?),
            None => None,
        };

        let schema = match raw.schema_source.as_deref() {
            Some(source) => Some(parse_schema(source).map_err(|e| CompileError::Schema {
                url: url.clone(),
                message: e.message,
                offset: e.offset,
            })?),
            None => None,
        };
        let own_specs = match &schema {
            Some(schema) => resolve_fields(url, schema)?,
            None => Vec::new(),
        };
        let field_cards =
            try_join_all(own_specs.iter().map(|s| host.compiled_card(&s.field_card_url))).await?;

        let mut fields = parent
            .as_ref()
            .map(|p| p.fields.clone())
            .unwrap_or_default();
        let mut declared = HashSet::new();
        for (spec, card) in own_specs.into_iter().zip(field_cards) {
            if !declared.insert(spec.local_name.clone()) {
                warn!(card = %url, field = %spec.local_name, "field declared twice, last declaration wins");
            } else if fields.contains_key(&spec.local_name) {
                debug!(card = %url, field = %spec.local_name, "field overrides inherited declaration");
            }
            fields.insert(spec.local_name.clone(), ResolvedField { spec, card });
        }

        let mut modules = Vec::new();

        let schema_source = self.schema_source(raw, schema.as_ref(), parent.as_deref(), &fields);
        let schema_module =
            host.define(ModuleSource::javascript(url.clone(), SCHEMA_MODULE, schema_source))?;
        modules.push(schema_module.clone());

        let mut per_format = BTreeMap::new();
        for format in Format::TEMPLATED {
            if let Some(source) = raw.template(format) {
                let info = self.compile_format(host, url, format, source, &fields)?;
                modules.push(info.module_name.clone());
                per_format.insert(format, info);
                continue;
            }
            match parent.as_ref().and_then(|p| p.component(format)) {
                Some(inherited) => {
                    debug!(card = %url, %format, module = %inherited.module_name, "inheriting component");
                    per_format.insert(format, inherited.clone());
                }
                None if format.is_required() => {
                    return Err(CompileError::MissingFormat {
                        url: url.clone(),
                        format,
                    });
                }
                None => {}
            }
        }

        let mut assets = Vec::new();
        for (name, source) in raw.files.iter().filter(|(name, _)| name.ends_with(".css")) {
            let asset = host.define(ModuleSource::css(url.clone(), name.as_str(), source.clone()))?;
            assets.push(asset.clone());
            modules.push(asset);
        }

        if let Some(data) = &raw.data {
            for key in data.keys().filter(|k| !fields.contains_key(*k)) {
                warn!(card = %url, key = %key, "data value names no field");
            }
        }

        info!(
            card = %url,
            fields = fields.len(),
            formats = per_format.len(),
            modules = modules.len(),
            "compiled card"
        );
        Ok(CompiledCard {
            url: url.clone(),
            schema_module,
            fields,
            adopts_from: parent,
            per_format,
            data: raw.data.clone(),
            assets,
            modules,
        })
    }

    fn schema_source(
        &self,
        raw: &RawCard,
        schema: Option<&ParsedSchema>,
        parent: Option<&CompiledCard>,
        fields: &BTreeMap<String, ResolvedField>,
    ) -> String {
        let (Some(source), Some(schema)) = (raw.schema_source.as_deref(), schema) else {
            return default_schema(parent.map(|p| &p.schema_module));
        };
        let mut targets: BTreeMap<CardUrl, ModuleRef> = fields
            .values()
            .map(|f| (f.spec.field_card_url.clone(), f.card.schema_module.clone()))
            .collect();
        if let Some(parent) = parent {
            targets.insert(parent.url.clone(), parent.schema_module.clone());
        }
        rewrite_imports(&raw.url, source, schema, &targets)
    }

    fn compile_format(
        &self,
        host: &dyn CompileHost,
        url: &CardUrl,
        format: Format,
        source: &str,
        fields: &BTreeMap<String, ResolvedField>,
    ) -> Result<ComponentInfo, CompileError> {
        let bindings: BTreeMap<String, FieldBinding> = fields
            .iter()
            .map(|(name, field)| {
                let binding = FieldBinding {
                    inline: field
                        .card
                        .component(Format::Embedded)
                        .and_then(|c| c.inline_template_source.clone()),
                    plural: field.spec.arity == Arity::Plural,
                };
                (name.clone(), binding)
            })
            .collect();

        let mut unrenderable = None;
        let mut emit = |field: &str| {
            let card = fields.get(field).map(|f| &f.card);
            match card.and_then(|c| c.component(Format::Embedded)) {
                Some(info) => info.module_name.as_str().to_string(),
                None => {
                    unrenderable.get_or_insert_with(|| card.map(|c| c.url.clone()));
                    String::new()
                }
            }
        };
        let transformed = transform(source, &bindings, &mut emit).map_err(|source| {
            CompileError::Template {
                url: url.clone(),
                format,
                source,
            }
        })?;
        if let Some(field_card) = unrenderable {
            return Err(CompileError::MissingFormat {
                url: field_card.unwrap_or_else(|| url.clone()),
                format: Format::Embedded,
            });
        }

        let printed = print(&transformed.template);
        let inline = format == Format::Embedded
            && fields.is_empty()
            && transformed.components.is_empty()
            && printed.len() <= self.options.inline_threshold;

        let module_source = component_module(&printed, &transformed.components)?;
        let module_name = host.define(ModuleSource::javascript(
            url.clone(),
            format!("{}.js", format.as_str()),
            module_source,
        ))?;
        debug!(
            card = %url,
            %format,
            module = %module_name,
            used = ?transformed.used_fields,
            inline,
            "compiled format"
        );

        Ok(ComponentInfo {
            module_name,
            used_fields: transformed.used_fields,
            inline_template_source: inline.then_some(printed),
        })
    }
}
