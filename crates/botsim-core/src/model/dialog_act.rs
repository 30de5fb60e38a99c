//! The tagged dialog-act vocabulary used as the template NLU's label space (spec §3, §4.A).

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single communicative function a bot (or user) turn can perform.
///
/// Variants are deliberately a closed set matched exhaustively by the simulator's
/// policy (spec §9 "Dynamic dispatch in the simulator"): every arm of
/// [`crate::simulator::policy`] handles exactly one of these.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DialogAct {
    /// Bot asks the user for `slot`, extracted as `entity_type`.
    Request { slot: String, entity_type: String },
    /// Bot states a value for `slot`.
    Inform { slot: String },
    /// Bot asks for yes/no confirmation of `slot`.
    Confirm { slot: String },
    /// Bot's retry/clarification prompt after failing to extract `slot` (spec §4.C step 2,
    /// §4.E step 3a). Not enumerated in spec §3's prose list but required by every act-map
    /// consumer in §4.C/§4.E; the canonical key is `NER_error_<slot>`.
    NerError { slot: String },
    /// Bot acknowledges the intent was recognized.
    IntentSuccessMessage,
    /// Bot's fallback / "didn't understand" message.
    IntentFailureMessage,
    /// Bot's terminal success turn for the whole dialog.
    DialogSuccessMessage,
    /// Informational chit-chat; always ignorable during matching.
    SmallTalk,
    Greeting,
    Goodbye,
}

impl DialogAct {
    /// The canonical string key used in persisted dialog-act maps (spec §6), e.g.
    /// `request_destination@city`, `NER_error_date`, `intent_success_message`.
    pub fn act_key(&self) -> String {
        match self {
            DialogAct::Request { slot, entity_type } => format!("request_{slot}@{entity_type}"),
            DialogAct::Inform { slot } => format!("inform_{slot}"),
            DialogAct::Confirm { slot } => format!("confirm_{slot}"),
            DialogAct::NerError { slot } => format!("NER_error_{slot}"),
            DialogAct::IntentSuccessMessage => "intent_success_message".to_string(),
            DialogAct::IntentFailureMessage => "intent_failure_message".to_string(),
            DialogAct::DialogSuccessMessage => "dialog_success_message".to_string(),
            DialogAct::SmallTalk => "small_talk".to_string(),
            DialogAct::Greeting => "greeting".to_string(),
            DialogAct::Goodbye => "goodbye".to_string(),
        }
    }

    /// Parses a canonical act key back into a [`DialogAct`]. Returns `None` for keys that
    /// don't match any known shape (callers treat this as a configuration error upstream).
    pub fn parse_key(key: &str) -> Option<DialogAct> {
        if let Some(rest) = key.strip_prefix("request_") {
            let (slot, entity_type) = rest.split_once('@')?;
            return Some(DialogAct::Request {
                slot: slot.to_string(),
                entity_type: entity_type.to_string(),
            });
        }
        if let Some(slot) = key.strip_prefix("NER_error_") {
            return Some(DialogAct::NerError {
                slot: slot.to_string(),
            });
        }
        if let Some(slot) = key.strip_prefix("confirm_") {
            return Some(DialogAct::Confirm {
                slot: slot.to_string(),
            });
        }
        if let Some(slot) = key.strip_prefix("inform_") {
            return Some(DialogAct::Inform {
                slot: slot.to_string(),
            });
        }
        match key {
            "intent_success_message" => Some(DialogAct::IntentSuccessMessage),
            "intent_failure_message" => Some(DialogAct::IntentFailureMessage),
            "dialog_success_message" => Some(DialogAct::DialogSuccessMessage),
            "small_talk" => Some(DialogAct::SmallTalk),
            "greeting" => Some(DialogAct::Greeting),
            "goodbye" => Some(DialogAct::Goodbye),
            _ => None,
        }
    }

    /// The slot this act concerns, if any.
    pub fn slot(&self) -> Option<&str> {
        match self {
            DialogAct::Request { slot, .. }
            | DialogAct::Inform { slot }
            | DialogAct::Confirm { slot }
            | DialogAct::NerError { slot } => Some(slot),
            _ => None,
        }
    }
}

impl fmt::Display for DialogAct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.act_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips_through_act_key() {
        let act = DialogAct::Request {
            slot: "destination".to_string(),
            entity_type: "city".to_string(),
        };
        assert_eq!(act.act_key(), "request_destination@city");
        assert_eq!(DialogAct::parse_key(&act.act_key()), Some(act));
    }

    #[test]
    fn ner_error_round_trips() {
        let act = DialogAct::NerError {
            slot: "date".to_string(),
        };
        assert_eq!(act.act_key(), "NER_error_date");
        assert_eq!(DialogAct::parse_key("NER_error_date"), Some(act));
    }

    #[test]
    fn fixed_acts_round_trip() {
        for act in [
            DialogAct::IntentSuccessMessage,
            DialogAct::IntentFailureMessage,
            DialogAct::DialogSuccessMessage,
            DialogAct::SmallTalk,
            DialogAct::Greeting,
            DialogAct::Goodbye,
        ] {
            let key = act.act_key();
            assert_eq!(DialogAct::parse_key(&key), Some(act));
        }
    }

    #[test]
    fn unknown_key_parses_to_none() {
        assert_eq!(DialogAct::parse_key("not_a_real_act"), None);
    }
}
