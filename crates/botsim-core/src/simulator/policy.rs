//! The per-act user policy (spec §4.E step 5, §9 "Dynamic dispatch in the simulator").
//!
//! `BotAction` is the closed subset of [`DialogAct`] that ever reaches the policy: the
//! termination-check acts of step 3 (`NerError`, `IntentSuccessMessage`,
//! `IntentFailureMessage`, `DialogSuccessMessage`) are consumed before this point and never
//! enqueued, and `SmallTalk` is dropped in step 2. [`BotAction::from_dialog_act`] matches
//! every [`DialogAct`] variant exhaustively so that adding a new act to the vocabulary forces
//! a decision here too.

use crate::model::DialogAct;
use crate::nlg::SemanticFrame;

use super::state::{SessionState, UserActionKind};

/// The acts the user policy actually has to respond to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotAction {
    Request { slot: String, entity_type: String },
    Inform { slot: String },
    Confirm { slot: String },
    Greeting,
    Goodbye,
}

impl BotAction {
    /// Exhaustive over [`DialogAct`]; `None` means "this act is consumed by termination
    /// checks, never reaches the policy" (spec §4.E step 3/4).
    pub fn from_dialog_act(act: &DialogAct) -> Option<BotAction> {
        match act {
            DialogAct::Request { slot, entity_type } => Some(BotAction::Request {
                slot: slot.clone(),
                entity_type: entity_type.clone(),
            }),
            DialogAct::Inform { slot } => Some(BotAction::Inform { slot: slot.clone() }),
            DialogAct::Confirm { slot } => Some(BotAction::Confirm { slot: slot.clone() }),
            DialogAct::Greeting => Some(BotAction::Greeting),
            DialogAct::Goodbye => Some(BotAction::Goodbye),
            DialogAct::NerError { .. }
            | DialogAct::IntentSuccessMessage
            | DialogAct::IntentFailureMessage
            | DialogAct::DialogSuccessMessage
            | DialogAct::SmallTalk => None,
        }
    }
}

/// Why a `fail` action was produced, since the two causes get classified differently
/// upstream (spec §4.E step 5 vs. the "current pending request_slots" backtracking rule).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailReason {
    /// The requested slot isn't part of the goal at all — the bot must have switched
    /// intents, reclassified as `IntentError` regardless of the terminal act.
    NotInGoal,
    /// The slot is in the goal but its multi-value list has already been exhausted (spec
    /// §4.E step 5 "Multi-inform list exhaustion"), classified as `OtherError`.
    ListExhausted,
}

/// What the policy decided, ready for NLG rendering.
#[derive(Debug, Clone)]
pub struct PolicyResponse {
    pub frame: SemanticFrame,
    pub action: UserActionKind,
    /// The slot this response informed, if any — carried onto the turn stack for NER
    /// backtracking.
    pub informed_slot: Option<String>,
    pub fail_reason: Option<FailReason>,
}

/// Maps one queued bot action to a user response frame (spec §4.E step 5).
pub fn respond(bot_action: &BotAction, state: &mut SessionState) -> PolicyResponse {
    match bot_action {
        BotAction::Request { slot, .. } => respond_to_request(slot, state),
        BotAction::Inform { slot } => respond_to_inform(slot, state),
        BotAction::Confirm { slot } => respond_to_confirm(slot, state),
        BotAction::Greeting => respond_to_greeting(state),
        BotAction::Goodbye => PolicyResponse {
            frame: SemanticFrame::new("goodbye"),
            action: UserActionKind::Done,
            informed_slot: None,
            fail_reason: None,
        },
    }
}

fn respond_to_request(slot: &str, state: &mut SessionState) -> PolicyResponse {
    if !state.inform_slots.contains_key(slot) {
        return PolicyResponse {
            frame: SemanticFrame::new("fail"),
            action: UserActionKind::Fail,
            informed_slot: None,
            fail_reason: Some(FailReason::NotInGoal),
        };
    }
    match state.inform_slots.get_mut(slot).and_then(|v| v.next_value()) {
        Some(value) => {
            state.record_informed(slot, &value);
            PolicyResponse {
                frame: SemanticFrame::new("inform").inform(slot, value),
                action: UserActionKind::Inform,
                informed_slot: Some(slot.to_string()),
                fail_reason: None,
            }
        }
        // The slot is in the goal but its multi-value list is already exhausted (spec
        // §4.E step 5 "Multi-inform list exhaustion").
        None => PolicyResponse {
            frame: SemanticFrame::new("fail"),
            action: UserActionKind::Fail,
            informed_slot: None,
            fail_reason: Some(FailReason::ListExhausted),
        },
    }
}

/// The bot informed a value; the user acknowledges and advances to the next pending goal
/// slot, or says goodbye once everything has been addressed (spec §4.E step 5 `inform(slot=v)`).
fn respond_to_inform(_slot: &str, state: &mut SessionState) -> PolicyResponse {
    match next_pending_slot(state) {
        Some((slot, value)) => {
            state.record_informed(&slot, &value);
            PolicyResponse {
                frame: SemanticFrame::new("inform").inform(&slot, value),
                action: UserActionKind::Inform,
                informed_slot: Some(slot),
                fail_reason: None,
            }
        }
        None => PolicyResponse {
            frame: SemanticFrame::new("goodbye"),
            action: UserActionKind::Goodbye,
            informed_slot: None,
            fail_reason: None,
        },
    }
}

fn respond_to_confirm(slot: &str, state: &mut SessionState) -> PolicyResponse {
    // The user always affirms a confirmation of a value it actually informed — the
    // simulator never lies about its own goal.
    let affirmed = state.history_slots.contains_key(slot);
    PolicyResponse {
        frame: SemanticFrame::new("confirm").inform(slot, if affirmed { "yes" } else { "no" }),
        action: UserActionKind::Confirm,
        informed_slot: None,
        fail_reason: None,
    }
}

fn respond_to_greeting(state: &mut SessionState) -> PolicyResponse {
    let probe = state
        .inform_slots
        .get(crate::model::INTENT_KEY)
        .and_then(|v| v.peek())
        .unwrap_or_default()
        .to_string();
    PolicyResponse {
        frame: SemanticFrame::new("inform").inform(crate::model::INTENT_KEY, probe),
        action: UserActionKind::Initial,
        informed_slot: None,
        fail_reason: None,
    }
}

fn next_pending_slot(state: &SessionState) -> Option<(String, String)> {
    let slot = state.rest_slots.iter().next().cloned()?;
    let value = state.inform_slots.get(&slot)?.peek()?.to_string();
    Some((slot, value))
}
