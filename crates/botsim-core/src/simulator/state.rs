//! Per-session state carried across rounds of the agenda-based simulator (spec §4.E).

use std::collections::{HashMap, HashSet, VecDeque};

use crate::model::{DialogAct, Goal, InformValue, NerErrorKind, SessionOutcome};

/// The kind of action the user last took. Reset to `Initial` at the start of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserActionKind {
    Initial,
    Request,
    Inform,
    Confirm,
    Goodbye,
    Fail,
    Done,
}

/// One completed user turn, retained so error backtracking can find the turn that caused a
/// failure (spec §4.E "Error backtracking").
#[derive(Debug, Clone)]
pub struct TurnStackEntry {
    pub user_action: UserActionKind,
    pub round: usize,
    pub user_utterance: String,
    pub slot_annotated_utterance: String,
    /// The slot this turn informed, if any — used by NER-error backtracking to find the
    /// turn at which an erring slot was informed.
    pub informed_slot: Option<String>,
}

/// The full per-session mutable state, reset for each new goal (spec §4.E "Session state").
#[derive(Debug, Clone)]
pub struct SessionState {
    pub action: UserActionKind,
    /// Copy of the goal's inform slots, mutated as list values are popped (spec §4.E step
    /// 5 "Multi-inform list exhaustion").
    pub inform_slots: HashMap<String, InformValue>,
    /// Slots the bot is currently asking about this round, awaiting a policy response.
    pub request_slots: HashSet<String>,
    /// Slots already informed this session, by value.
    pub history_slots: HashMap<String, String>,
    /// Goal slots not yet addressed.
    pub rest_slots: HashSet<String>,
    pub informed_user_turn: HashMap<String, usize>,
    pub intent_succeed: bool,
    pub intent_error: Option<SessionOutcome>,
    pub ner_errors: HashMap<String, (NerErrorKind, String, usize)>,
    pub runtime_error: Option<String>,
    pub bot_action_queue: VecDeque<DialogAct>,
    pub turn_stack: Vec<TurnStackEntry>,
    pub round: usize,
}

impl SessionState {
    /// Builds the initial state for `goal` (spec §4.E "Session state (reset per goal)").
    pub fn new(goal: &Goal) -> Self {
        let rest_slots: HashSet<String> = goal
            .inform_slots
            .keys()
            .filter(|k| k.as_str() != crate::model::INTENT_KEY)
            .cloned()
            .collect();
        Self {
            action: UserActionKind::Initial,
            inform_slots: goal.inform_slots.clone(),
            request_slots: HashSet::new(),
            history_slots: HashMap::new(),
            rest_slots,
            informed_user_turn: HashMap::new(),
            intent_succeed: false,
            intent_error: None,
            ner_errors: HashMap::new(),
            runtime_error: None,
            bot_action_queue: VecDeque::new(),
            turn_stack: Vec::new(),
            round: 0,
        }
    }

    /// Records a completed turn onto the backtracking stack (spec §4.E).
    pub fn push_turn(
        &mut self,
        user_action: UserActionKind,
        utterance: String,
        annotated: String,
        informed_slot: Option<String>,
    ) {
        self.turn_stack.push(TurnStackEntry {
            user_action,
            round: self.round,
            user_utterance: utterance,
            slot_annotated_utterance: annotated,
            informed_slot,
        });
    }

    /// Marks `slot` as informed this round: moves it from `rest_slots` into
    /// `history_slots`, records the turn it was informed at.
    pub fn record_informed(&mut self, slot: &str, value: &str) {
        self.rest_slots.remove(slot);
        self.history_slots.insert(slot.to_string(), value.to_string());
        self.informed_user_turn.insert(slot.to_string(), self.round);
    }

    /// Finds the round at which `slot` was informed, walking the turn stack oldest to
    /// newest (spec §4.E "NERError -> walks turn_stack from oldest to newest").
    pub fn round_slot_was_informed(&self, slot: &str) -> Option<usize> {
        self.turn_stack
            .iter()
            .find(|t| t.informed_slot.as_deref() == Some(slot))
            .map(|t| t.round)
    }

    /// The last turn's round, or `None` if no turn has completed yet (spec §4.E
    /// "OtherError -> the last turn in turn_stack").
    pub fn last_turn_round(&self) -> Option<usize> {
        self.turn_stack.last().map(|t| t.round)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_seeds_rest_slots_from_goal_excluding_intent_key() {
        let goal = Goal::new("book_flight", "I want to fly").with_slot("destination", "Paris");
        let state = SessionState::new(&goal);
        assert!(state.rest_slots.contains("destination"));
        assert!(!state.rest_slots.contains(crate::model::INTENT_KEY));
    }

    #[test]
    fn record_informed_moves_slot_from_rest_to_history() {
        let goal = Goal::new("book_flight", "I want to fly").with_slot("destination", "Paris");
        let mut state = SessionState::new(&goal);
        state.round = 2;
        state.record_informed("destination", "Paris");
        assert!(!state.rest_slots.contains("destination"));
        assert_eq!(state.history_slots.get("destination"), Some(&"Paris".to_string()));
        assert_eq!(state.informed_user_turn.get("destination"), Some(&2));
    }

    #[test]
    fn round_slot_was_informed_finds_oldest_matching_turn() {
        let goal = Goal::new("book_flight", "I want to fly");
        let mut state = SessionState::new(&goal);
        state.round = 1;
        state.push_turn(UserActionKind::Inform, "Paris".into(), "@slot:\"Paris\"".into(), Some("destination".into()));
        state.round = 3;
        state.push_turn(UserActionKind::Inform, "Rome".into(), "@slot:\"Rome\"".into(), Some("destination".into()));
        assert_eq!(state.round_slot_was_informed("destination"), Some(1));
    }
}
