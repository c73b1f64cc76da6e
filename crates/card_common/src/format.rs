//! Card rendering formats.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A rendering context for a card.
///
/// `Isolated`, `Embedded` and `Edit` carry a template; `Data` names the
/// card's raw data and never has one.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Full-page rendering of a card.
    Isolated,
    /// Rendering of a card inside another card.
    Embedded,
    /// Editing form.
    Edit,
    /// The card's data, without a template.
    Data,
}

impl Format {
    /// Formats that are backed by a template, in compile order.
    pub const TEMPLATED: [Format; 3] = [Format::Isolated, Format::Embedded, Format::Edit];

    /// Returns the lowercase name used in bundles and module names.
    pub fn as_str(self) -> &'static str {
        match self {
            Format::Isolated => "isolated",
            Format::Embedded => "embedded",
            Format::Edit => "edit",
            Format::Data => "data",
        }
    }

    /// Returns `true` for formats every consumer may render, which must
    /// therefore resolve to a template.
    pub fn is_required(self) -> bool {
        matches!(self, Format::Isolated | Format::Embedded)
    }

    /// Returns `true` if the format carries a template.
    pub fn has_template(self) -> bool {
        !matches!(self, Format::Data)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown format name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown card format `{0}`")]
pub struct ParseFormatError(pub String);

impl FromStr for Format {
    type Err = ParseFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "isolated" => Ok(Format::Isolated),
            "embedded" => Ok(Format::Embedded),
            "edit" => Ok(Format::Edit),
            "data" => Ok(Format::Data),
            other => Err(ParseFormatError(other.to_string())),
        }
    }
}
