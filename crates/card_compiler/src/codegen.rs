//! Module source generation.
//!
//! The compiler never evaluates anything itself. It produces module source
//! text here and hands it to the host's `define` capability.

use std::fmt::Write;

use card_common::ModuleRef;
use card_template::FieldComponent;

use crate::error::CompileError;

const RUNTIME_IMPORTS: &str = "\
import { setComponentTemplate } from \"@ember/component\";
import { precompileTemplate } from \"@ember/template-compilation\";
import templateOnlyComponent from \"@ember/component/template-only\";
";

/// Schema module for a card that has no schema source of its own.
pub fn default_schema(parent: Option<&ModuleRef>) -> String {
    match parent {
        Some(parent) => format!(
            "import Parent from {};\nexport default class extends Parent {{}}\n",
            quote(parent.as_str())
        ),
        None => "export default class {}\n".to_string(),
    }
}

/// Template-only component module rendering `template`, with every
/// generated field component in scope.
pub fn component_module(
    template: &str,
    components: &[FieldComponent],
) -> Result<String, CompileError> {
    let template = serde_json::to_string(template).map_err(|e| CompileError::Codegen {
        reason: e.to_string(),
    })?;

    let mut out = String::from(RUNTIME_IMPORTS);
    for component in components {
        let _ = writeln!(
            out,
            "import {} from {};",
            component.identifier,
            quote(&component.module)
        );
    }
    let scope = components
        .iter()
        .map(|c| c.identifier.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let _ = writeln!(
        out,
        "export default setComponentTemplate(precompileTemplate({template}, {{ strictMode: true, scope: () => ({{ {scope} }}) }}), templateOnlyComponent());"
    );
    Ok(out)
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}
