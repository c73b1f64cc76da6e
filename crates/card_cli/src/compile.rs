//! `cards compile`: compile a card into the module cache.

use std::path::Path;

use anyhow::Result;
use card_compiler::CompiledCard;
use serde_json::{json, Map, Value};

use crate::{project, CompileArgs};

/// Runs the `cards compile` command.
pub async fn run(project_dir: &Path, args: &CompileArgs) -> Result<()> {
    let url = project::card_url(&args.url)?;
    let builder = project::builder(project_dir)?;
    let card = builder.get_compiled_card(&url).await?;
    println!("{}", serde_json::to_string_pretty(&summary(&card))?);

    if args.cleanup {
        builder.cleanup()?;
    }
    Ok(())
}

/// A JSON overview of a compiled card.
pub fn summary(card: &CompiledCard) -> Value {
    let fields: Map<String, Value> = card
        .fields
        .iter()
        .map(|(name, field)| {
            (
                name.clone(),
                json!({
                    "card": field.spec.field_card_url,
                    "arity": field.spec.arity,
                    "computed": field.spec.is_computed,
                }),
            )
        })
        .collect();
    let formats: Map<String, Value> = card
        .per_format
        .iter()
        .map(|(format, info)| {
            (
                format.to_string(),
                json!({
                    "module": info.module_name,
                    "usedFields": info.used_fields,
                    "inline": info.inline_template_source.is_some(),
                }),
            )
        })
        .collect();

    json!({
        "url": card.url,
        "adoptsFrom": card.adopts_from.as_ref().map(|p| &p.url),
        "schemaModule": card.schema_module,
        "fields": fields,
        "formats": formats,
        "assets": card.assets,
        "modules": card.modules,
    })
}
