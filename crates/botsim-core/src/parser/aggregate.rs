//! Step 4 of the parser (spec §4.C): aggregates each intent-bearing dialog's act map with
//! every act map reachable from it, so the NLU recognizes any act a legitimate
//! continuation might emit.

use std::collections::HashMap;

use super::act_map_builder::build_local_act_map;
use super::raw::RawBundle;
use crate::model::{ConversationGraph, DialogAct, DialogActMap, DialogActMapSet};

/// Builds the local act map for every dialog in `bundle`.
pub fn local_act_maps(bundle: &RawBundle) -> DialogActMapSet {
    bundle
        .dialogs
        .iter()
        .map(|dialog| (dialog.name.clone(), build_local_act_map(dialog)))
        .collect()
}

/// For every dialog `d`, aggregates `DialogActMap[d]` with the union of act maps of every
/// node on a simple path from `d` to `terminal` (spec §4.C step 4). Also imports
/// `intent_failure_message` from `confused_node` if present.
pub fn aggregate_act_maps(
    bundle: &RawBundle,
    graph: &ConversationGraph,
    terminal: &str,
    confused_node: Option<&str>,
    max_paths: usize,
) -> DialogActMapSet {
    let locals = local_act_maps(bundle);
    let mut aggregated = HashMap::new();

    for dialog in &bundle.dialogs {
        let mut map = locals.get(&dialog.name).cloned().unwrap_or_default();
        let reachable = graph.reachable_interior(&dialog.name, terminal, max_paths);
        for node in &reachable {
            if let Some(other) = locals.get(node) {
                map.merge(other);
            }
        }
        if let Some(confused) = confused_node {
            if let Some(confused_map) = locals.get(confused) {
                import_intent_failure_message(&mut map, confused_map);
            }
        }
        aggregated.insert(dialog.name.clone(), map);
    }

    aggregated
}

fn import_intent_failure_message(into: &mut DialogActMap, from: &DialogActMap) {
    let exemplars = from.exemplars_for(&DialogAct::IntentFailureMessage);
    if !exemplars.is_empty() {
        into.register_many(DialogAct::IntentFailureMessage, exemplars.iter().cloned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::raw::{RawDialog, RawStep};

    fn linear_bundle() -> RawBundle {
        RawBundle {
            dialogs: vec![
                RawDialog {
                    name: "book_flight".into(),
                    steps: vec![
                        RawStep::Message { text: "Sure, let's book a flight.".into() },
                        RawStep::Navigate { target: "collect_destination".into() },
                    ],
                },
                RawDialog {
                    name: "collect_destination".into(),
                    steps: vec![
                        RawStep::Collect {
                            slot: "destination".into(),
                            entity: "city".into(),
                            prompt: "Where to?".into(),
                            retries: vec![],
                        },
                        RawStep::Navigate { target: "done".into() },
                    ],
                },
                RawDialog {
                    name: "done".into(),
                    steps: vec![RawStep::Message { text: "All set!".into() }],
                },
            ],
            intents: vec![],
            entities: vec![],
        }
    }

    #[test]
    fn aggregated_map_includes_reachable_requests() {
        let bundle = linear_bundle();
        let graph = super::super::graph_builder::build_graph(&bundle);
        let aggregated = aggregate_act_maps(&bundle, &graph, "done", None, 1000);
        let book_flight_map = &aggregated["book_flight"];
        assert!(!book_flight_map
            .exemplars_for(&DialogAct::Request { slot: "destination".into(), entity_type: "city".into() })
            .is_empty());
    }
}
