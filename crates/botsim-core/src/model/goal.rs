//! Simulation goals (spec §3, §4.D).

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Sentinel used for a request slot whose value the user expects the bot to fill in,
/// rather than one the user already knows (spec §3).
pub const UNK: &str = "UNK";

/// The key used inside `inform_slots` to carry the probe sentence for the first user turn
/// (spec §3, §4.D).
pub const INTENT_KEY: &str = "intent";

/// The key used inside `inform_slots` for a second probe in a multi-intent goal (spec §4.D,
/// flagged as an integration Open Question upstream — see DESIGN.md).
pub const SUBSEQUENT_INTENT_KEY: &str = "subsequent_intent";

/// A value the user can inform, either a single value or an ordered queue to be revealed
/// one at a time across repeated `request` turns (spec §4.E step 5, "Multi-inform list
/// exhaustion").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InformValue {
    Single(String),
    List(VecDeque<String>),
}

impl InformValue {
    /// Pops (and returns) the next value to inform. For `Single`, returns the value without
    /// consuming it (it can be re-informed, e.g. on a correction). For `List`, pops the
    /// head; once exhausted, returns `None` — spec §4.E step 5's "third ask would produce
    /// `fail`".
    pub fn next_value(&mut self) -> Option<String> {
        match self {
            InformValue::Single(v) => Some(v.clone()),
            InformValue::List(q) => q.pop_front(),
        }
    }

    /// The value to compare the bot's informed value against for goal correction (spec
    /// §4.E step 5 `inform(slot=v)`), without mutating list state.
    pub fn peek(&self) -> Option<&str> {
        match self {
            InformValue::Single(v) => Some(v.as_str()),
            InformValue::List(q) => q.front().map(String::as_str),
        }
    }
}

impl From<&str> for InformValue {
    fn from(s: &str) -> Self {
        InformValue::Single(s.to_string())
    }
}

impl From<String> for InformValue {
    fn from(s: String) -> Self {
        InformValue::Single(s)
    }
}

impl From<Vec<String>> for InformValue {
    fn from(v: Vec<String>) -> Self {
        InformValue::List(v.into())
    }
}

/// A structured specification the simulator tries to fulfill during one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub name: String,
    pub request_slots: HashMap<String, String>,
    pub inform_slots: HashMap<String, InformValue>,
}

impl Goal {
    /// Builds a single-intent goal: `request_slots = {name -> UNK}` per spec §3/§4.D.
    pub fn new(name: impl Into<String>, seed_or_paraphrase: impl Into<String>) -> Self {
        let name = name.into();
        let mut request_slots = HashMap::new();
        request_slots.insert(name.clone(), UNK.to_string());
        let mut inform_slots = HashMap::new();
        inform_slots.insert(INTENT_KEY.to_string(), InformValue::Single(seed_or_paraphrase.into()));
        Self {
            name,
            request_slots,
            inform_slots,
        }
    }

    pub fn with_slot(mut self, slot: impl Into<String>, value: impl Into<InformValue>) -> Self {
        self.inform_slots.insert(slot.into(), value.into());
        self
    }

    pub fn intent_probe(&self) -> Option<&str> {
        match self.inform_slots.get(INTENT_KEY) {
            Some(InformValue::Single(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn subsequent_intent(&self) -> Option<&str> {
        match self.inform_slots.get(SUBSEQUENT_INTENT_KEY) {
            Some(InformValue::Single(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Concatenates `self` and `second`'s probe into a multi-intent goal (spec §4.D).
    pub fn concat_multi_intent(mut self, second: &Goal) -> Self {
        if let Some(probe) = second.intent_probe() {
            self.inform_slots
                .insert(SUBSEQUENT_INTENT_KEY.to_string(), InformValue::Single(probe.to_string()));
        }
        self
    }
}
