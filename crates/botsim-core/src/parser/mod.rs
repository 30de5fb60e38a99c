//! Parser & Graph Modeler (spec §4.C): turns a raw bot definition into a dialog-act map per
//! dialog, a conversation multigraph, and an entity ontology.
//!
//! The five steps of §4.C map onto submodules:
//! 1. [`vendor`] / [`raw`] — vendor bundle ingestion into the platform-neutral [`RawBundle`].
//! 2. [`act_map_builder`] — per-dialog local dialog-act map.
//! 3. [`graph_builder`] — the conversation multigraph.
//! 4. [`aggregate`] — act-map aggregation by graph reachability.
//! 5. [`ontology_builder`] — placeholder ontology samples.

pub mod act_map_builder;
pub mod aggregate;
pub mod graph_builder;
pub mod ontology_builder;
pub mod raw;
pub mod vendor;

use std::collections::HashMap;

use crate::model::{ConversationGraph, DialogActMapSet, Entity, Ontology};
use raw::RawBundle;

/// The complete output of running the parser over one [`RawBundle`] (spec §4.C steps 1-5):
/// the conversation graph, the aggregated per-dialog act maps, and the placeholder
/// ontology. This is what the `parse` CLI command persists as `conf/dialog_act_map.json`
/// and `conf/ontology.json` (spec §6).
#[derive(Debug, Clone)]
pub struct ParsedBot {
    pub graph: ConversationGraph,
    pub act_maps: DialogActMapSet,
    pub ontology: Ontology,
    /// Custom and system entity definitions declared by the bundle, keyed by name. This is
    /// what the `parse` CLI command persists as `goals_dir/entities.json` (spec §6), later
    /// read back by the remediator for NER remediation hints (spec §4.G step 5).
    pub entities: HashMap<String, Entity>,
    /// Dialogs that declared a `Collect` step whose entity couldn't be resolved against
    /// `entities`; flagged and excluded from simulation rather than failing the whole parse
    /// (spec §4.C "Failure semantics").
    pub excluded_dialogs: Vec<String>,
}

/// Runs the full parser pipeline (spec §4.C steps 2-5) over an already-ingested
/// [`RawBundle`]. `terminal` is the designated terminal dialog name and `confused_node`,
/// if present, is the dialog whose `intent_failure_message` exemplars get imported into
/// every other dialog's aggregated map (spec §4.C step 4).
pub fn parse_bundle(
    bundle: &RawBundle,
    terminal: &str,
    confused_node: Option<&str>,
    max_paths: usize,
) -> ParsedBot {
    let graph = graph_builder::build_graph(bundle);
    let act_maps = aggregate::aggregate_act_maps(bundle, &graph, terminal, confused_node, max_paths);

    let entities: HashMap<String, Entity> = bundle
        .entities
        .iter()
        .map(|def| (def.name().to_string(), raw_entity_to_entity(def)))
        .collect();
    let ontology = ontology_builder::build_ontology(&act_maps, &entities);

    let excluded_dialogs = unresolvable_collect_dialogs(bundle, &entities);

    ParsedBot {
        graph,
        act_maps,
        ontology,
        entities,
        excluded_dialogs,
    }
}

fn raw_entity_to_entity(def: &raw::RawEntityDef) -> Entity {
    match def {
        raw::RawEntityDef::ValueList { values, .. } => Entity::ValueList { values: values.clone() },
        raw::RawEntityDef::Regex { pattern, .. } => Entity::Regex { pattern: pattern.clone() },
    }
}

/// Flags dialogs with a `Collect` step whose entity name resolves neither to a declared
/// custom entity nor to a recognized system-entity name (spec §4.C "Failure semantics":
/// "the parser emits a warning but keeps going; such dialogs are flagged and excluded from
/// simulation").
fn unresolvable_collect_dialogs(bundle: &RawBundle, entities: &HashMap<String, Entity>) -> Vec<String> {
    const KNOWN_SYSTEM_ENTITIES: &[&str] = &[
        "number", "date", "email", "address", "currency", "time", "phone", "name", "yesno", "yes_no",
    ];

    bundle
        .dialogs
        .iter()
        .filter(|dialog| {
            dialog.steps.iter().any(|step| match step {
                raw::RawStep::Collect { entity, .. } => {
                    !entities.contains_key(entity) && !KNOWN_SYSTEM_ENTITIES.contains(&entity.to_ascii_lowercase().as_str())
                }
                _ => false,
            })
        })
        .map(|dialog| {
            tracing::warn!(dialog = %dialog.name, "collect step has an unresolvable entity, excluding dialog from simulation");
            dialog.name.clone()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use raw::{RawDialog, RawEntityDef, RawStep};

    fn bundle_with_unresolvable_entity() -> RawBundle {
        RawBundle {
            dialogs: vec![RawDialog {
                name: "book_flight".into(),
                steps: vec![RawStep::Collect {
                    slot: "loyalty_tier".into(),
                    entity: "loyalty_tier_enum".into(),
                    prompt: "What's your loyalty tier?".into(),
                    retries: vec![],
                }],
            }],
            intents: vec![],
            entities: vec![RawEntityDef::ValueList {
                name: "city".into(),
                values: vec!["Paris".into()],
            }],
        }
    }

    #[test]
    fn flags_dialogs_with_unresolvable_collect_entities() {
        let bundle = bundle_with_unresolvable_entity();
        let parsed = parse_bundle(&bundle, "done", None, 1000);
        assert_eq!(parsed.excluded_dialogs, vec!["book_flight".to_string()]);
    }

    #[test]
    fn known_system_entity_names_are_not_flagged() {
        let bundle = RawBundle {
            dialogs: vec![RawDialog {
                name: "book_flight".into(),
                steps: vec![RawStep::Collect {
                    slot: "date".into(),
                    entity: "date".into(),
                    prompt: "When?".into(),
                    retries: vec![],
                }],
            }],
            intents: vec![],
            entities: vec![],
        };
        let parsed = parse_bundle(&bundle, "done", None, 1000);
        assert!(parsed.excluded_dialogs.is_empty());
    }
}
