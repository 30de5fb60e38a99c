//! Entity definitions backing slot extraction (spec §3).

use serde::{Deserialize, Serialize};

/// A system entity kind recognized by well-known extraction rules (spec §4.C step 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemEntityKind {
    Number,
    Date,
    Email,
    Address,
    Currency,
    Time,
    Phone,
    Name,
    YesNo,
}

/// A single entity definition, as declared by the bot builder or a custom entity bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entity {
    /// An enumerated, ordered set of acceptable values.
    ValueList { values: Vec<String> },
    /// A regular expression the value must match.
    Regex { pattern: String },
    /// A well-known system entity type.
    System { kind: SystemEntityKind },
}

impl Entity {
    pub fn type_name(&self) -> &'static str {
        match self {
            Entity::ValueList { .. } => "value_list",
            Entity::Regex { .. } => "regex",
            Entity::System { .. } => "system",
        }
    }
}
