//! Plain-text utterances, optionally carrying `${slot}` placeholders.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single line of dialog text, as produced by a template or a live bot.
///
/// Placeholders use the `${slot}` convention throughout this crate (see
/// [`crate::nlg`]); `Utterance` itself does no substitution, it is just the
/// carrier type so call sites don't pass around bare `String`s for both
/// rendered and unrendered text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Utterance(pub String);

impl Utterance {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for Utterance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Utterance {
    fn from(s: String) -> Self {
        Utterance(s)
    }
}

impl From<&str> for Utterance {
    fn from(s: &str) -> Self {
        Utterance(s.to_string())
    }
}
