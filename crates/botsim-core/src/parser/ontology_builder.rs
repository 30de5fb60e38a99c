//! Step 5 of the parser (spec §4.C): builds placeholder ontology samples for every
//! `request_<s>@<entity>` act registered in an aggregated dialog-act map.

use crate::model::{DialogActMapSet, Entity, Ontology, SystemEntityKind};
use std::collections::HashMap;

/// Cap on how many values a regex entity is enumerated into (spec §4.C step 5).
const MAX_REGEX_SAMPLES: usize = 10;

/// Builds an ontology of synthetic placeholder samples for every dialog in `act_maps`,
/// looking up each request slot's declared entity in `entities` (spec §4.C step 5). The
/// result is explicitly a placeholder until an operator reviews it.
pub fn build_ontology(act_maps: &DialogActMapSet, entities: &HashMap<String, Entity>) -> Ontology {
    let mut ontology = Ontology::new();
    for (dialog, act_map) in act_maps {
        for (slot, entity_name) in act_map.request_slots() {
            let samples = match entities.get(entity_name) {
                Some(entity) => sample_values(entity),
                None => system_samples_by_name(entity_name),
            };
            ontology.set_samples(dialog, slot, samples);
        }
    }
    ontology
}

fn sample_values(entity: &Entity) -> Vec<String> {
    match entity {
        Entity::ValueList { values } => values.clone(),
        Entity::Regex { pattern } => enumerate_regex(pattern),
        Entity::System { kind } => system_samples(*kind),
    }
}

/// Falls back to a system-entity sample set when the request act names a well-known kind
/// directly (e.g. `request_date@date`) rather than a custom entity definition.
fn system_samples_by_name(entity_type: &str) -> Vec<String> {
    match entity_type.to_ascii_lowercase().as_str() {
        "number" => system_samples(SystemEntityKind::Number),
        "date" => system_samples(SystemEntityKind::Date),
        "email" => system_samples(SystemEntityKind::Email),
        "address" => system_samples(SystemEntityKind::Address),
        "currency" => system_samples(SystemEntityKind::Currency),
        "time" => system_samples(SystemEntityKind::Time),
        "phone" => system_samples(SystemEntityKind::Phone),
        "name" => system_samples(SystemEntityKind::Name),
        "yesno" | "yes_no" => system_samples(SystemEntityKind::YesNo),
        _ => Vec::new(),
    }
}

/// Deterministic placeholder generators, one per well-known system entity kind (spec §4.C
/// step 5).
fn system_samples(kind: SystemEntityKind) -> Vec<String> {
    match kind {
        SystemEntityKind::Number => vec!["1".into(), "2".into(), "42".into()],
        SystemEntityKind::Date => vec!["2025-01-01".into(), "2025-06-15".into(), "2025-12-01".into()],
        SystemEntityKind::Email => vec!["user@example.com".into()],
        SystemEntityKind::Address => vec!["123 Main St".into()],
        SystemEntityKind::Currency => vec!["$10".into(), "$100".into()],
        SystemEntityKind::Time => vec!["9:00 AM".into(), "3:30 PM".into()],
        SystemEntityKind::Phone => vec!["555-0100".into()],
        SystemEntityKind::Name => vec!["Alex".into(), "Jordan".into()],
        SystemEntityKind::YesNo => vec!["yes".into(), "no".into()],
    }
}

/// Enumerates up to [`MAX_REGEX_SAMPLES`] literal samples from a regex pattern. This
/// doesn't attempt full regex-language enumeration: it recognizes simple alternation
/// groups (`(a|b|c)`) and literal patterns, which covers the entity definitions vendor
/// bundles actually export; anything else yields a single placeholder sample.
fn enumerate_regex(pattern: &str) -> Vec<String> {
    if let (Some(open), Some(close)) = (pattern.find('('), pattern.rfind(')')) {
        if open < close {
            let inner = &pattern[open + 1..close];
            let alternatives: Vec<String> = inner.split('|').map(str::to_string).collect();
            if alternatives.len() > 1 {
                return alternatives.into_iter().take(MAX_REGEX_SAMPLES).collect();
            }
        }
    }
    vec![format!("<{pattern}>")]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DialogAct, Utterance};

    #[test]
    fn builds_samples_for_custom_value_list_entity() {
        let mut act_maps = DialogActMapSet::new();
        let mut map = crate::model::DialogActMap::new();
        map.register(
            DialogAct::Request {
                slot: "destination".into(),
                entity_type: "city".into(),
            },
            Utterance::new("Where to?"),
        );
        act_maps.insert("book_flight".into(), map);

        let mut entities = HashMap::new();
        entities.insert(
            "city".to_string(),
            Entity::ValueList {
                values: vec!["Paris".into(), "Rome".into()],
            },
        );

        let ontology = build_ontology(&act_maps, &entities);
        assert_eq!(
            ontology.samples_for("book_flight", "destination"),
            Some(["Paris".to_string(), "Rome".to_string()].as_slice())
        );
    }

    #[test]
    fn falls_back_to_system_samples_by_entity_name() {
        let mut act_maps = DialogActMapSet::new();
        let mut map = crate::model::DialogActMap::new();
        map.register(
            DialogAct::Request {
                slot: "date".into(),
                entity_type: "date".into(),
            },
            Utterance::new("When?"),
        );
        act_maps.insert("book_flight".into(), map);

        let ontology = build_ontology(&act_maps, &HashMap::new());
        assert!(!ontology.samples_for("book_flight", "date").unwrap().is_empty());
    }

    #[test]
    fn enumerates_alternation_regex_capped() {
        let samples = enumerate_regex("(mon|tue|wed|thu|fri|sat|sun)");
        assert_eq!(samples.len(), 7);
        assert!(samples.contains(&"mon".to_string()));
    }
}
