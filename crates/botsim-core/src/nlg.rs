//! Template NLG (spec §4.B): renders a user/bot semantic frame into a natural-language
//! utterance plus its slot-annotated twin, via pure string substitution — no reflection,
//! no templating engine (spec §9 "Replace placeholder rendering").

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use crate::error::ConfigError;

static SLOT_PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\{(\w+)\}").unwrap());

/// A semantic frame: the action plus the slots it informs and requests (spec §4.B input).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SemanticFrame {
    pub action: String,
    pub inform_slots: HashMap<String, String>,
    pub request_slots: BTreeSet<String>,
}

impl SemanticFrame {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            inform_slots: HashMap::new(),
            request_slots: BTreeSet::new(),
        }
    }

    pub fn inform(mut self, slot: impl Into<String>, value: impl Into<String>) -> Self {
        self.inform_slots.insert(slot.into(), value.into());
        self
    }

    pub fn request(mut self, slot: impl Into<String>) -> Self {
        self.request_slots.insert(slot.into());
        self
    }

    fn inform_slot_names(&self) -> BTreeSet<String> {
        self.inform_slots.keys().cloned().collect()
    }
}

/// A single NLG response template: a string with `${slot}` placeholders, tagged with the
/// exact inform/request slot sets it applies to (spec §4.B selection rule).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NlgTemplate {
    pub action: String,
    pub inform_slots: BTreeSet<String>,
    pub request_slots: BTreeSet<String>,
    pub text: String,
}

/// A loaded bank of templates for one role (user or bot), as read from `conf/template.json`
/// (spec §6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateBank {
    templates: Vec<NlgTemplate>,
}

impl TemplateBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a template bank from `conf/template.json` (spec §6).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Json {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|source| ConfigError::Json {
            path: "<in-memory>".to_string(),
            source,
        })
    }

    pub fn add(&mut self, template: NlgTemplate) {
        self.templates.push(template);
    }

    /// Finds the unique template whose declared slot sets equal the frame's (spec §4.B
    /// selection rule). Returns a `ConfigError` — never a silent fallback — if zero or more
    /// than one template matches, since duplicate matches are as much a spec error as none.
    fn select(&self, frame: &SemanticFrame) -> Result<&NlgTemplate, ConfigError> {
        let inform_names = frame.inform_slot_names();
        let matches: Vec<&NlgTemplate> = self
            .templates
            .iter()
            .filter(|t| t.action == frame.action && t.inform_slots == inform_names && t.request_slots == frame.request_slots)
            .collect();

        match matches.as_slice() {
            [single] => Ok(single),
            [] => Err(ConfigError::Invalid(format!(
                "no NLG template matches action '{}' with inform_slots={:?} request_slots={:?}",
                frame.action, inform_names, frame.request_slots
            ))),
            _ => Err(ConfigError::Invalid(format!(
                "ambiguous NLG templates for action '{}': {} candidates",
                frame.action,
                matches.len()
            ))),
        }
    }

    /// Renders `frame`: returns the natural-language utterance and its slot-annotated twin
    /// (`${slot}` replaced with `@slot:"value"` markers, spec §4.B output).
    pub fn render(&self, frame: &SemanticFrame) -> Result<(String, String), ConfigError> {
        let template = self.select(frame)?;
        let rendered = substitute(&template.text, &frame.inform_slots, |value| value.to_string());
        let annotated = substitute(&template.text, &frame.inform_slots, |value| format!("@slot:\"{value}\""));
        Ok((rendered, annotated))
    }
}

/// Substitutes every `${slot}` occurrence (possibly more than once per slot) using
/// `format_value` (spec §4.B: "for multi-slot templates substitute once per occurrence").
fn substitute(text: &str, values: &HashMap<String, String>, format_value: impl Fn(&str) -> String) -> String {
    SLOT_PLACEHOLDER
        .replace_all(text, |caps: &regex::Captures| {
            let slot = &caps[1];
            match values.get(slot) {
                Some(value) => format_value(value),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}
