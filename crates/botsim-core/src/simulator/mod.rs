//! Agenda-Based User Simulator (spec §4.E): the per-session state machine that conducts one
//! conversation over a target dialog/intent and classifies its outcome.
//!
//! [`state`] holds the per-session mutable state and [`policy`] the per-act response rules;
//! this module is the engine tying them to the NLU ([`crate::nlu`]) and NLG
//! ([`crate::nlg`]) and implementing the per-round protocol and termination checks of
//! spec §4.E steps 1-8 plus error backtracking.

pub mod policy;
pub mod state;

use std::collections::HashMap;

use crate::error::ConfigError;
use crate::model::{DialogAct, DialogActMap, Goal, NerErrorKind, SessionOutcome};
use crate::nlg::{SemanticFrame, TemplateBank};
use crate::nlu;

use policy::{respond, BotAction, FailReason};
use state::{SessionState, UserActionKind};

/// Knobs the simulator needs per spec §4.E/§6 `simulator.run_time`.
#[derive(Debug, Clone, Copy)]
pub struct SimulatorConfig {
    pub max_round_num: usize,
    /// The round on which the bot's classification outcome is expected to be observable;
    /// `{2, 3}` in practice (spec §4.E).
    pub intent_check_turn_index: usize,
}

/// What happened on one round: either the session continues with a new user utterance, or
/// it terminated with a [`SessionOutcome`].
#[derive(Debug, Clone)]
pub enum RoundOutcome {
    Continue { utterance: String, annotated: String },
    Terminated(SessionOutcome),
}

/// One completed NLU match against a bot message for this round, retained so step 3's
/// termination checks can inspect the whole round before the policy runs (spec §4.E step
/// 2-3).
struct MatchedAct {
    act: DialogAct,
}

/// Drives one conversation for one [`Goal`] against `intent`'s aggregated dialog-act map.
/// `other_intents` carries every other intent's aggregated map, needed for the cross-intent
/// confusion check of step 3g and the fallback-union import of `intent_failure_message`.
pub struct Simulator {
    goal: Goal,
    intent: String,
    act_map: DialogActMap,
    other_intents: Vec<(String, DialogActMap)>,
    templates: TemplateBank,
    config: SimulatorConfig,
    state: SessionState,
    /// `true` for bot-initiated platforms (e.g. Dialogflow CX): round 0 is the bot's
    /// greeting, so the simulator's phantom `request_intent` act fires before any bot
    /// message is received (spec §4.E "Initial-turn rule").
    bot_initiated: bool,
}

impl Simulator {
    pub fn new(
        goal: Goal,
        intent: impl Into<String>,
        act_map: DialogActMap,
        other_intents: Vec<(String, DialogActMap)>,
        templates: TemplateBank,
        config: SimulatorConfig,
        bot_initiated: bool,
    ) -> Self {
        let state = SessionState::new(&goal);
        Self {
            goal,
            intent: intent.into(),
            act_map,
            other_intents,
            templates,
            config,
            state,
            bot_initiated,
        }
    }

    /// For platforms where the user speaks first (not bot-initiated), produces the opening
    /// probe turn directly from the goal's intent key, without any bot message to react to
    /// (spec §4.E step 5 "greeting -> emit the initial intent probe").
    pub fn opening_turn(&mut self) -> Result<(String, String), ConfigError> {
        let response = policy::respond(&BotAction::Greeting, &mut self.state);
        self.render(&response.frame, UserActionKind::Initial, None)
    }

    /// Runs one round of the protocol (spec §4.E steps 1-8): matches every bot message to
    /// an act, runs the termination checks in order, and — if the session didn't terminate
    /// — enqueues the remaining acts and runs the policy/NLG to produce the next user
    /// utterance.
    ///
    /// Returns `Err` only for the hard configuration error of step 3d (ambiguous act map);
    /// every other outcome, including all four [`SessionOutcome`] variants, is a normal
    /// `Ok(RoundOutcome::Terminated(..))`.
    pub fn receive_round(&mut self, bot_messages: &[String]) -> Result<RoundOutcome, ConfigError> {
        self.state.round += 1;
        let round = self.state.round;

        if self.bot_initiated && round == 1 {
            // The phantom request_intent act: the bot's greeting is itself the first
            // message, so fold it into the same round as the real content below rather
            // than special-casing it — `bot_action_queue` starts empty either way.
        }

        let matched = self.match_round(bot_messages)?;

        if let Some(outcome) = self.check_ambiguous_request(bot_messages, &matched) {
            return Err(outcome);
        }

        if let Some(outcome) = self.run_termination_checks(bot_messages, &matched, round) {
            return Ok(RoundOutcome::Terminated(outcome));
        }

        if round > self.config.max_round_num {
            return Ok(RoundOutcome::Terminated(SessionOutcome::OtherError {
                error_turn_idx: round,
                details: "round budget exceeded with no terminal act".to_string(),
            }));
        }

        self.enqueue(&matched);
        self.run_policy()
    }

    /// Step 2: matches each bot message against the target intent's act map, collapses
    /// consecutive equal acts, and drops `small_talk` (spec §4.E step 2).
    fn match_round(&self, bot_messages: &[String]) -> Result<Vec<MatchedAct>, ConfigError> {
        if self.act_map.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "dialog-act map for '{}' is empty; session must be discarded",
                self.intent
            )));
        }

        let mut matched = Vec::new();
        let mut previous: Option<DialogAct> = None;
        for message in bot_messages {
            let result = nlu::match_message(message, &self.act_map);
            let Some(act) = result.best_act else { continue };
            if act == DialogAct::SmallTalk {
                previous = None;
                continue;
            }
            if previous.as_ref() == Some(&act) {
                continue;
            }
            previous = Some(act.clone());
            matched.push(MatchedAct { act });
        }
        Ok(matched)
    }

    /// Step 3d: a hard configuration error if two distinct `request_<s>` acts are matched
    /// for the *same* bot message — never silently pick one (spec §4.E step 3d).
    fn check_ambiguous_request(&self, bot_messages: &[String], _matched: &[MatchedAct]) -> Option<ConfigError> {
        for message in bot_messages {
            let normalized = nlu::normalize_message(message);
            let mut request_acts: Vec<&DialogAct> = self
                .act_map
                .acts()
                .filter(|act| matches!(act, DialogAct::Request { .. }))
                .filter(|act| {
                    self.act_map
                        .exemplars_for(act)
                        .iter()
                        .any(|exemplar| nlu::similarity(&normalized, exemplar.as_str()) >= 99.0)
                })
                .collect();
            request_acts.sort_by_key(|act| act.act_key());
            request_acts.dedup();
            if request_acts.len() > 1 {
                return Some(ConfigError::AmbiguousActMap {
                    dialog: self.intent.clone(),
                    acts: request_acts.iter().map(|a| a.act_key()).collect(),
                });
            }
        }
        None
    }

    /// Steps 3a, 3b, 3c, 3e, 3g: the ordered termination checks, run once per round over
    /// every matched act (spec §4.E step 3).
    fn run_termination_checks(&mut self, bot_messages: &[String], matched: &[MatchedAct], round: usize) -> Option<SessionOutcome> {
        // 3a: NER_error_<s> for a slot already in history_slots.
        for m in matched {
            if let DialogAct::NerError { slot } = &m.act {
                if let Some(expected_value) = self.state.history_slots.get(slot).cloned() {
                    let error_turn_idx = self.state.round_slot_was_informed(slot).unwrap_or(round);
                    return Some(SessionOutcome::NerError {
                        error_turn_idx,
                        slot: slot.clone(),
                        error_kind: NerErrorKind::Missed,
                        expected_value,
                    });
                }
            }
        }

        // 3b: intent_success_message on the intent-check turn.
        if round == self.config.intent_check_turn_index
            && matched.iter().any(|m| m.act == DialogAct::IntentSuccessMessage)
        {
            self.state.intent_succeed = true;
        }

        // 3c: intent_failure_message.
        if matched.iter().any(|m| m.act == DialogAct::IntentFailureMessage) {
            if round == self.config.intent_check_turn_index {
                return Some(self.intent_error_at_probe());
            }
            if let Some((slot, value)) = self.most_recently_informed() {
                return Some(SessionOutcome::NerError {
                    error_turn_idx: self.state.informed_user_turn.get(&slot).copied().unwrap_or(round),
                    slot,
                    error_kind: NerErrorKind::Wrong,
                    expected_value: value,
                });
            }
        }

        // 3e: dialog_success_message.
        if matched.iter().any(|m| m.act == DialogAct::DialogSuccessMessage) {
            return Some(if self.state.intent_succeed {
                SessionOutcome::Success { num_turns: round }
            } else {
                self.intent_error_at_probe()
            });
        }

        // 3g: cross-intent confusion check, only evaluated on the intent-check turn.
        if round == self.config.intent_check_turn_index {
            if let Some(outcome) = self.check_cross_intent_confusion(bot_messages) {
                return Some(outcome);
            }
        }

        // "If the current pending request_slots contains a slot absent from the goal, the
        // session is reclassified as IntentError regardless" (spec §4.E "Error
        // backtracking").
        for slot in &self.state.request_slots {
            if !self.goal.inform_slots.contains_key(slot) {
                return Some(self.intent_error_at_probe());
            }
        }

        None
    }

    /// Re-matches this round's bot message(s) against every other intent's
    /// `intent_success_message` exemplars; if any scores higher than the target intent's
    /// own best match, the bot classified the user into the wrong intent (spec §4.E step
    /// 3g).
    fn check_cross_intent_confusion(&self, bot_messages: &[String]) -> Option<SessionOutcome> {
        if self.other_intents.is_empty() {
            return None;
        }
        let combined = bot_messages.join(" ");
        let target_best = nlu::similarity(
            &nlu::normalize_message(&combined),
            self.act_map
                .exemplars_for(&DialogAct::IntentSuccessMessage)
                .iter()
                .map(|u| u.as_str())
                .next()
                .unwrap_or(""),
        );
        let scored = nlu::best_intent_across(
            &combined,
            self.other_intents.iter().map(|(name, map)| (name.clone(), map.clone())),
        );
        let (best_other, best_other_score) = scored.into_iter().next()?;
        if best_other_score > target_best {
            return Some(SessionOutcome::IntentError {
                error_turn_idx: self.probe_turn_idx(),
                user_utterance: self.goal.intent_probe().unwrap_or_default().to_string(),
                predicted_intent: best_other,
            });
        }
        None
    }

    fn intent_error_at_probe(&self) -> SessionOutcome {
        SessionOutcome::IntentError {
            error_turn_idx: self.probe_turn_idx(),
            user_utterance: self.goal.intent_probe().unwrap_or_default().to_string(),
            predicted_intent: "out_of_domain".to_string(),
        }
    }

    /// The turn holding the user's initial intent probe: `intent_check_turn_index - 2`
    /// (spec §4.E "Error backtracking" IntentError rule), floored at 1.
    fn probe_turn_idx(&self) -> usize {
        self.config.intent_check_turn_index.saturating_sub(2).max(1)
    }

    fn most_recently_informed(&self) -> Option<(String, String)> {
        self.state
            .informed_user_turn
            .iter()
            .max_by_key(|(_, round)| **round)
            .and_then(|(slot, _)| self.state.history_slots.get(slot).map(|v| (slot.clone(), v.clone())))
    }

    /// Step 4: converts every matched act that wasn't consumed by termination checks into a
    /// queued bot action (spec §4.E step 4).
    fn enqueue(&mut self, matched: &[MatchedAct]) {
        for m in matched {
            self.state.bot_action_queue.push_back(m.act.clone());
        }
    }

    /// Steps 5-7: drains the queue, runs the policy per act, and concatenates the resulting
    /// NLG renderings into this round's user utterance (spec §4.E steps 5-7).
    ///
    /// Returns `Err` if the NLG has no template for a frame the policy produced (spec §4.B:
    /// "the NLG fails loudly — this is a specification error in the template file"); the
    /// caller discards the session the same way it does for an ambiguous act map.
    fn run_policy(&mut self) -> Result<RoundOutcome, ConfigError> {
        let mut utterance_parts = Vec::new();
        let mut annotated_parts = Vec::new();
        let mut last_fail_reason = None;

        while let Some(act) = self.state.bot_action_queue.pop_front() {
            let Some(bot_action) = BotAction::from_dialog_act(&act) else { continue };
            let response = respond(&bot_action, &mut self.state);
            if let Some(reason) = response.fail_reason {
                last_fail_reason = Some(reason);
                continue;
            }
            let (rendered, annotated) = self.render(&response.frame, response.action, response.informed_slot.clone())?;
            if !rendered.is_empty() {
                utterance_parts.push(rendered);
            }
            if !annotated.is_empty() {
                annotated_parts.push(annotated);
            }
        }

        if utterance_parts.is_empty() {
            if let Some(reason) = last_fail_reason {
                return Ok(RoundOutcome::Terminated(match reason {
                    FailReason::NotInGoal => self.intent_error_at_probe(),
                    FailReason::ListExhausted => SessionOutcome::OtherError {
                        error_turn_idx: self.state.last_turn_round().unwrap_or(self.state.round),
                        details: "multi-value inform list exhausted with no further request to satisfy".to_string(),
                    },
                }));
            }
        }

        Ok(RoundOutcome::Continue {
            utterance: utterance_parts.join(" "),
            annotated: annotated_parts.join(" "),
        })
    }

    /// Step 6-7: renders a user frame via NLG and records the turn on the backtracking
    /// stack (spec §4.E steps 6-7, "Error backtracking"). Propagates the NLG's `ConfigError`
    /// rather than degrading to an empty utterance (spec §4.B "fails loudly"): a missing or
    /// ambiguous template is a specification error in the template file, the same class of
    /// hard failure as the ambiguous-act-map check in [`Self::match_round`].
    fn render(&mut self, frame: &SemanticFrame, action: UserActionKind, informed_slot: Option<String>) -> Result<(String, String), ConfigError> {
        let (rendered, annotated) = self.templates.render(frame)?;
        self.state.action = action;
        self.state.push_turn(action, rendered.clone(), annotated.clone(), informed_slot);
        Ok((rendered, annotated))
    }

    pub fn goal(&self) -> &Goal {
        &self.goal
    }

    pub fn round(&self) -> usize {
        self.state.round
    }
}

/// Builds the `other_intents` argument for [`Simulator::new`]: every act map in `all_maps`
/// except `target`, paired with its dialog name (spec §4.E step 3g).
pub fn other_intents_excluding(all_maps: &HashMap<String, DialogActMap>, target: &str) -> Vec<(String, DialogActMap)> {
    all_maps
        .iter()
        .filter(|(name, _)| name.as_str() != target)
        .map(|(name, map)| (name.clone(), map.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Utterance;
    use std::collections::BTreeSet;

    fn templates_for_flight_goal() -> TemplateBank {
        let mut bank = TemplateBank::new();
        bank.add(crate::nlg::NlgTemplate {
            action: "inform".into(),
            inform_slots: ["intent".to_string()].into_iter().collect(),
            request_slots: BTreeSet::new(),
            text: "${intent}".into(),
        });
        bank.add(crate::nlg::NlgTemplate {
            action: "inform".into(),
            inform_slots: ["destination".to_string()].into_iter().collect(),
            request_slots: BTreeSet::new(),
            text: "I'd like to go to ${destination}.".into(),
        });
        bank.add(crate::nlg::NlgTemplate {
            action: "inform".into(),
            inform_slots: ["date".to_string()].into_iter().collect(),
            request_slots: BTreeSet::new(),
            text: "On ${date}.".into(),
        });
        bank.add(crate::nlg::NlgTemplate {
            action: "confirm".into(),
            inform_slots: ["date".to_string()].into_iter().collect(),
            request_slots: BTreeSet::new(),
            text: "Yes, ${date} works.".into(),
        });
        bank.add(crate::nlg::NlgTemplate {
            action: "goodbye".into(),
            inform_slots: BTreeSet::new(),
            request_slots: BTreeSet::new(),
            text: "Thanks, bye!".into(),
        });
        bank
    }

    fn book_flight_act_map() -> DialogActMap {
        let mut map = DialogActMap::new();
        map.register(DialogAct::IntentSuccessMessage, Utterance::new("Sure, I can help you book a flight."));
        map.register(
            DialogAct::Request { slot: "destination".into(), entity_type: "city".into() },
            Utterance::new("Where would you like to fly to?"),
        );
        map.register(
            DialogAct::Request { slot: "date".into(), entity_type: "date".into() },
            Utterance::new("What date would you like to travel?"),
        );
        map.register(DialogAct::Confirm { slot: "date".into() }, Utterance::new("Shall I confirm that date?"));
        map.register(DialogAct::IntentFailureMessage, Utterance::new("Sorry, I didn't understand that."));
        map.register(DialogAct::DialogSuccessMessage, Utterance::new("Your flight is booked!"));
        map
    }

    fn happy_path_goal() -> Goal {
        Goal::new("book_flight", "I want to fly to Paris tomorrow")
            .with_slot("destination", "Paris")
            .with_slot("date", "2025-12-01")
    }

    #[test]
    fn happy_path_reaches_success() {
        let config = SimulatorConfig { max_round_num: 20, intent_check_turn_index: 1 };
        let mut sim = Simulator::new(
            happy_path_goal(),
            "book_flight",
            book_flight_act_map(),
            vec![],
            templates_for_flight_goal(),
            config,
            false,
        );

        let (probe, _) = sim.opening_turn().unwrap();
        assert_eq!(probe, "I want to fly to Paris tomorrow");

        let r1 = sim.receive_round(&["Sure, I can help you book a flight.".to_string()]).unwrap();
        assert!(matches!(r1, RoundOutcome::Continue { .. }));

        let r2 = sim.receive_round(&["Where would you like to fly to?".to_string()]).unwrap();
        let RoundOutcome::Continue { utterance, .. } = r2 else { panic!("expected continue") };
        assert!(utterance.contains("Paris"));

        let r3 = sim.receive_round(&["What date would you like to travel?".to_string()]).unwrap();
        assert!(matches!(r3, RoundOutcome::Continue { .. }));

        let r4 = sim.receive_round(&["Shall I confirm that date?".to_string()]).unwrap();
        assert!(matches!(r4, RoundOutcome::Continue { .. }));

        let r5 = sim.receive_round(&["Your flight is booked!".to_string()]).unwrap();
        match r5 {
            RoundOutcome::Terminated(SessionOutcome::Success { num_turns }) => assert_eq!(num_turns, 5),
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[test]
    fn intent_failure_on_check_turn_is_intent_error() {
        let config = SimulatorConfig { max_round_num: 20, intent_check_turn_index: 3 };
        let mut sim = Simulator::new(
            happy_path_goal(),
            "book_flight",
            book_flight_act_map(),
            vec![],
            templates_for_flight_goal(),
            config,
            false,
        );
        sim.opening_turn().unwrap();
        sim.receive_round(&["Sure, I can help you book a flight.".to_string()]).unwrap();
        sim.receive_round(&["Where would you like to fly to?".to_string()]).unwrap();
        let r3 = sim.receive_round(&["Sorry, I didn't understand that.".to_string()]).unwrap();
        match r3 {
            RoundOutcome::Terminated(SessionOutcome::IntentError { error_turn_idx, predicted_intent, .. }) => {
                assert_eq!(error_turn_idx, 1);
                assert_eq!(predicted_intent, "out_of_domain");
            }
            other => panic!("expected intent error, got {other:?}"),
        }
    }

    #[test]
    fn round_budget_exceeded_is_other_error() {
        let config = SimulatorConfig { max_round_num: 1, intent_check_turn_index: 3 };
        let mut sim = Simulator::new(
            happy_path_goal(),
            "book_flight",
            book_flight_act_map(),
            vec![],
            templates_for_flight_goal(),
            config,
            false,
        );
        sim.opening_turn().unwrap();
        sim.receive_round(&["Sure, I can help you book a flight.".to_string()]).unwrap();
        let r2 = sim.receive_round(&["Where would you like to fly to?".to_string()]).unwrap();
        match r2 {
            RoundOutcome::Terminated(SessionOutcome::OtherError { error_turn_idx, .. }) => {
                assert_eq!(error_turn_idx, 2);
            }
            other => panic!("expected other error, got {other:?}"),
        }
    }

    #[test]
    fn cross_intent_confusion_classifies_as_other_intent() {
        let config = SimulatorConfig { max_round_num: 20, intent_check_turn_index: 1 };
        let mut cancel_map = DialogActMap::new();
        cancel_map.register(DialogAct::IntentSuccessMessage, Utterance::new("Sure, I can help you cancel a flight."));
        let mut sim = Simulator::new(
            happy_path_goal(),
            "book_flight",
            book_flight_act_map(),
            vec![("cancel_flight".to_string(), cancel_map)],
            templates_for_flight_goal(),
            config,
            false,
        );
        sim.opening_turn().unwrap();
        let r1 = sim.receive_round(&["Sure, I can help you cancel a flight.".to_string()]).unwrap();
        match r1 {
            RoundOutcome::Terminated(SessionOutcome::IntentError { predicted_intent, .. }) => {
                assert_eq!(predicted_intent, "cancel_flight");
            }
            other => panic!("expected cross-intent confusion, got {other:?}"),
        }
    }

    #[test]
    fn empty_act_map_is_a_config_error() {
        let config = SimulatorConfig { max_round_num: 20, intent_check_turn_index: 3 };
        let mut sim = Simulator::new(
            happy_path_goal(),
            "book_flight",
            DialogActMap::new(),
            vec![],
            templates_for_flight_goal(),
            config,
            false,
        );
        let result = sim.receive_round(&["anything".to_string()]);
        assert!(result.is_err());
    }

    /// Spec §4.B: "the NLG fails loudly — this is a specification error in the template
    /// file." A bot `request(destination)` with no matching NLG template must propagate a
    /// `ConfigError` out of `receive_round`, not degrade to an empty utterance and continue
    /// (mirrors `empty_act_map_is_a_config_error`'s discard-on-error contract).
    #[test]
    fn missing_nlg_template_is_propagated_as_config_error() {
        let config = SimulatorConfig { max_round_num: 20, intent_check_turn_index: 3 };
        let mut bank = TemplateBank::new();
        bank.add(crate::nlg::NlgTemplate {
            action: "inform".into(),
            inform_slots: ["intent".to_string()].into_iter().collect(),
            request_slots: BTreeSet::new(),
            text: "${intent}".into(),
        });
        let mut sim = Simulator::new(happy_path_goal(), "book_flight", book_flight_act_map(), vec![], bank, config, false);
        sim.opening_turn().unwrap();
        sim.receive_round(&["Sure, I can help you book a flight.".to_string()]).unwrap();

        let result = sim.receive_round(&["Where would you like to fly to?".to_string()]);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }
}
