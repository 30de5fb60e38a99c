//! Drives a complete simulated session through the public `Simulator` API end to end (spec
//! §4.E), from the opening intent probe to a `Success` outcome.

use std::collections::BTreeSet;

use botsim_core::model::{DialogAct, DialogActMap, Goal, SessionOutcome, Utterance};
use botsim_core::nlg::{NlgTemplate, TemplateBank};
use botsim_core::simulator::{RoundOutcome, Simulator, SimulatorConfig};

fn templates() -> TemplateBank {
    let mut bank = TemplateBank::new();
    bank.add(NlgTemplate {
        action: "inform".into(),
        inform_slots: ["intent".to_string()].into_iter().collect(),
        request_slots: BTreeSet::new(),
        text: "${intent}".into(),
    });
    bank.add(NlgTemplate {
        action: "inform".into(),
        inform_slots: ["destination".to_string()].into_iter().collect(),
        request_slots: BTreeSet::new(),
        text: "I'd like to go to ${destination}.".into(),
    });
    bank.add(NlgTemplate {
        action: "inform".into(),
        inform_slots: ["date".to_string()].into_iter().collect(),
        request_slots: BTreeSet::new(),
        text: "On ${date}.".into(),
    });
    bank.add(NlgTemplate {
        action: "confirm".into(),
        inform_slots: ["date".to_string()].into_iter().collect(),
        request_slots: BTreeSet::new(),
        text: "Yes, ${date} works.".into(),
    });
    bank.add(NlgTemplate {
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

fn goal() -> Goal {
    Goal::new("book_flight", "I want to fly to Paris tomorrow")
        .with_slot("destination", "Paris")
        .with_slot("date", "2025-12-01")
}

#[test]
fn full_conversation_reaches_success() {
    let config = SimulatorConfig { max_round_num: 20, intent_check_turn_index: 1 };
    let mut sim = Simulator::new(goal(), "book_flight", book_flight_act_map(), vec![], templates(), config, false);

    let (probe, annotated_probe) = sim.opening_turn().expect("opening turn should render");
    assert_eq!(probe, "I want to fly to Paris tomorrow");
    assert_eq!(annotated_probe, "I want to fly to Paris tomorrow");

    let r1 = sim
        .receive_round(&["Sure, I can help you book a flight.".to_string()])
        .expect("round 1");
    assert!(matches!(r1, RoundOutcome::Continue { .. }));

    let r2 = sim
        .receive_round(&["Where would you like to fly to?".to_string()])
        .expect("round 2");
    let RoundOutcome::Continue { utterance, .. } = r2 else { panic!("expected continue") };
    assert!(utterance.contains("Paris"));

    let r3 = sim
        .receive_round(&["What date would you like to travel?".to_string()])
        .expect("round 3");
    let RoundOutcome::Continue { utterance, .. } = r3 else { panic!("expected continue") };
    assert!(utterance.contains("2025-12-01"));

    let r4 = sim
        .receive_round(&["Shall I confirm that date?".to_string()])
        .expect("round 4");
    assert!(matches!(r4, RoundOutcome::Continue { .. }));

    let r5 = sim
        .receive_round(&["Your flight is booked!".to_string()])
        .expect("round 5");
    match r5 {
        RoundOutcome::Terminated(SessionOutcome::Success { num_turns }) => assert_eq!(num_turns, 5),
        other => panic!("expected success, got {other:?}"),
    }

    assert_eq!(sim.goal().inform_slots.len(), 3);
    assert_eq!(sim.round(), 5);
}

#[test]
fn multiple_intent_check_failure_is_classified_as_ner_wrong_value() {
    // Once the intent already succeeded, a later `intent_failure_message` on a round where
    // the user most recently informed a slot is reclassified as a wrong NER value rather
    // than an intent error (spec §4.E step 3c).
    let config = SimulatorConfig { max_round_num: 20, intent_check_turn_index: 1 };
    let mut sim = Simulator::new(goal(), "book_flight", book_flight_act_map(), vec![], templates(), config, false);

    sim.opening_turn().unwrap();
    sim.receive_round(&["Sure, I can help you book a flight.".to_string()]).unwrap();
    sim.receive_round(&["Where would you like to fly to?".to_string()]).unwrap();

    let r3 = sim
        .receive_round(&["Sorry, I didn't understand that.".to_string()])
        .unwrap();
    match r3 {
        RoundOutcome::Terminated(SessionOutcome::NerError { slot, expected_value, .. }) => {
            assert_eq!(slot, "destination");
            assert_eq!(expected_value, "Paris");
        }
        other => panic!("expected NER error, got {other:?}"),
    }
}
