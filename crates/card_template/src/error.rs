//! Error types for template parsing and transformation.

/// Errors produced while parsing or transforming a template.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    /// The template source is malformed.
    #[error("template syntax error at byte {offset}: {message}")]
    Syntax {
        /// What went wrong.
        message: String,
        /// Byte offset into the source where the problem was detected.
        offset: usize,
    },

    /// The inline template of a field could not be parsed while splicing it.
    #[error("inline template of field `{field}` is invalid: {source}")]
    Inline {
        /// The field whose inline template failed.
        field: String,
        /// The underlying parse failure.
        #[source]
        source: Box<TemplateError>,
    },
}

impl TemplateError {
    /// Creates a syntax error at `offset`.
    pub fn syntax(message: impl Into<String>, offset: usize) -> Self {
        Self::Syntax {
            message: message.into(),
            offset,
        }
    }
}
