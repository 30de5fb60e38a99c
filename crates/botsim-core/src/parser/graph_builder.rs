//! Step 3 of the parser (spec §4.C): builds the conversation multigraph from navigation
//! steps across every dialog.

use super::raw::{RawBundle, RawStep};
use crate::model::ConversationGraph;

/// Builds the multigraph: one node per dialog, one edge per `Navigate`/`Condition`/
/// `SubDialogInvoke` step, labeled with the transition condition (or empty for an
/// unconditional jump). Cycles are permitted (spec §4.C step 3, §9 "Cyclic graphs").
pub fn build_graph(bundle: &RawBundle) -> ConversationGraph {
    let mut graph = ConversationGraph::new();
    for dialog in &bundle.dialogs {
        graph.ensure_node(&dialog.name);
        for step in &dialog.steps {
            match step {
                RawStep::Navigate { target } => {
                    graph.add_edge(&dialog.name, target, "");
                }
                RawStep::Condition { expression, target } => {
                    graph.add_edge(&dialog.name, target, expression.clone());
                }
                RawStep::SubDialogInvoke { target } => {
                    graph.add_edge(&dialog.name, target, "");
                }
                RawStep::Message { .. } | RawStep::Collect { .. } => {}
            }
        }
    }
    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::raw::RawDialog;

    #[test]
    fn navigation_and_condition_steps_become_edges() {
        let bundle = RawBundle {
            dialogs: vec![
                RawDialog {
                    name: "greet".into(),
                    steps: vec![RawStep::Navigate { target: "collect_destination".into() }],
                },
                RawDialog {
                    name: "collect_destination".into(),
                    steps: vec![RawStep::Condition {
                        expression: "destination_known".into(),
                        target: "confirm".into(),
                    }],
                },
                RawDialog {
                    name: "confirm".into(),
                    steps: vec![],
                },
            ],
            intents: vec![],
            entities: vec![],
        };
        let graph = build_graph(&bundle);
        assert!(graph.has_path_to_terminal("greet", "confirm", 100));
        let greet_id = graph.node_id("greet").unwrap();
        assert_eq!(graph.edges_from(greet_id).len(), 1);
    }
}
