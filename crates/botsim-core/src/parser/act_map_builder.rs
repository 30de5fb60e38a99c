//! Step 2 of the parser (spec §4.C): builds one dialog's local dialog-act map from its raw
//! steps, before any cross-dialog aggregation.

use once_cell::sync::Lazy;
use regex::Regex;

use super::raw::{RawDialog, RawStep};
use crate::model::{DialogAct, DialogActMap, Utterance};

static VARIABLE_PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{[^}]*\}").unwrap());

/// Strips `{...}` variable placeholders from a bot message (spec §4.C step 2).
fn strip_variables(text: &str) -> String {
    VARIABLE_PLACEHOLDER.replace_all(text, "").split_whitespace().collect::<Vec<_>>().join(" ")
}

struct PlainRun {
    text: String,
    had_request_before: bool,
}

/// Builds `dialog`'s local act map: `Collect` steps become `request_<slot>@<entity>` and
/// `NER_error_<slot>`; consecutive plain messages are concatenated into runs and registered
/// as `intent_success_message`/`small_talk`, with the final run also registered as
/// `dialog_success_message` (spec §4.C step 2).
pub fn build_local_act_map(dialog: &RawDialog) -> DialogActMap {
    let mut map = DialogActMap::new();
    let mut has_request = false;
    let mut buffer: Vec<String> = Vec::new();
    let mut runs: Vec<PlainRun> = Vec::new();

    fn flush(buffer: &mut Vec<String>, runs: &mut Vec<PlainRun>, has_request: bool) {
        if buffer.is_empty() {
            return;
        }
        runs.push(PlainRun {
            text: buffer.join(" "),
            had_request_before: has_request,
        });
        buffer.clear();
    }

    for step in &dialog.steps {
        match step {
            RawStep::Message { text } => {
                buffer.push(strip_variables(text));
            }
            RawStep::Collect { slot, entity, prompt, retries } => {
                flush(&mut buffer, &mut runs, has_request);
                map.register(
                    DialogAct::Request {
                        slot: slot.clone(),
                        entity_type: entity.clone(),
                    },
                    Utterance::new(strip_variables(prompt)),
                );
                if !retries.is_empty() {
                    map.register_many(
                        DialogAct::NerError { slot: slot.clone() },
                        retries.iter().map(|r| Utterance::new(strip_variables(r))),
                    );
                }
                has_request = true;
            }
            RawStep::Condition { .. } | RawStep::Navigate { .. } | RawStep::SubDialogInvoke { .. } => {
                flush(&mut buffer, &mut runs, has_request);
            }
        }
    }
    flush(&mut buffer, &mut runs, has_request);

    let last_index = runs.len().saturating_sub(1);
    for (idx, run) in runs.iter().enumerate() {
        let act = if idx == 0 && !run.had_request_before {
            DialogAct::IntentSuccessMessage
        } else {
            DialogAct::SmallTalk
        };
        map.register(act, Utterance::new(run.text.clone()));
        if idx == last_index {
            map.register(DialogAct::DialogSuccessMessage, Utterance::new(run.text.clone()));
        }
    }

    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greeting_dialog_registers_intent_success_message() {
        let dialog = RawDialog {
            name: "book_flight".into(),
            steps: vec![
                RawStep::Message {
                    text: "Sure, I can help you book a flight.".into(),
                },
                RawStep::Collect {
                    slot: "destination".into(),
                    entity: "city".into(),
                    prompt: "Where would you like to go?".into(),
                    retries: vec!["Sorry, I didn't catch that city.".into()],
                },
                RawStep::Message {
                    text: "All booked!".into(),
                },
            ],
        };
        let map = build_local_act_map(&dialog);
        assert_eq!(map.exemplars_for(&DialogAct::IntentSuccessMessage).len(), 1);
        assert_eq!(map.exemplars_for(&DialogAct::DialogSuccessMessage).len(), 1);
        assert_eq!(
            map.exemplars_for(&DialogAct::NerError { slot: "destination".into() }).len(),
            1
        );
    }

    #[test]
    fn dialog_starting_with_collect_has_no_intent_success_message() {
        let dialog = RawDialog {
            name: "cancel_flight".into(),
            steps: vec![
                RawStep::Collect {
                    slot: "booking_id".into(),
                    entity: "number".into(),
                    prompt: "What's your booking id?".into(),
                    retries: vec![],
                },
                RawStep::Message {
                    text: "Cancelled.".into(),
                },
            ],
        };
        let map = build_local_act_map(&dialog);
        assert!(map.exemplars_for(&DialogAct::IntentSuccessMessage).is_empty());
        assert_eq!(map.exemplars_for(&DialogAct::SmallTalk).len(), 1);
        assert_eq!(map.exemplars_for(&DialogAct::DialogSuccessMessage).len(), 1);
    }

    #[test]
    fn strips_variable_placeholders() {
        assert_eq!(strip_variables("Booking for {city} on {date}."), "Booking for on .");
    }
}
