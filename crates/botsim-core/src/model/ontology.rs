//! Per-dialog slot/sample-value catalog (spec §3, §4.C step 5).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// `dialog_name -> slot_name -> ordered sample values`.
///
/// Produced by the parser with synthetic placeholder values; an operator is expected to
/// overwrite it with realistic values before simulation (spec §3 invariant). This crate
/// never blocks on that review step — it's a file the CLI's `parse` command writes and the
/// `goals`/`simulate` commands read back, same as `conf/ontology.json` vs.
/// `conf/ontology.revised.json` in spec §6.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ontology {
    dialogs: HashMap<String, HashMap<String, Vec<String>>>,
}

impl Ontology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_samples(&mut self, dialog: &str, slot: &str, samples: Vec<String>) {
        self.dialogs
            .entry(dialog.to_string())
            .or_default()
            .insert(slot.to_string(), samples);
    }

    pub fn samples_for(&self, dialog: &str, slot: &str) -> Option<&[String]> {
        self.dialogs.get(dialog)?.get(slot).map(Vec::as_slice)
    }

    pub fn slots_for(&self, dialog: &str) -> impl Iterator<Item = &String> {
        self.dialogs.get(dialog).into_iter().flat_map(|m| m.keys())
    }

    pub fn dialogs(&self) -> impl Iterator<Item = &String> {
        self.dialogs.keys()
    }

    /// Checks the ontology-completeness invariant of spec §8: every `request_<s>` act in
    /// `act_map` has a matching, non-empty ontology entry for `dialog`.
    pub fn is_complete_for(&self, dialog: &str, act_map: &super::act_map::DialogActMap) -> bool {
        act_map.request_slots().iter().all(|(slot, _entity)| {
            self.samples_for(dialog, slot)
                .map(|v| !v.is_empty())
                .unwrap_or(false)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::dialog_act::DialogAct;
    use crate::model::utterance::Utterance;

    #[test]
    fn completeness_fails_when_slot_missing() {
        let mut act_map = super::super::act_map::DialogActMap::new();
        act_map.register(
            DialogAct::Request {
                slot: "destination".into(),
                entity_type: "city".into(),
            },
            Utterance::new("Where to?"),
        );
        let ontology = Ontology::new();
        assert!(!ontology.is_complete_for("book_flight", &act_map));
    }

    #[test]
    fn completeness_passes_when_samples_present() {
        let mut act_map = super::super::act_map::DialogActMap::new();
        act_map.register(
            DialogAct::Request {
                slot: "destination".into(),
                entity_type: "city".into(),
            },
            Utterance::new("Where to?"),
        );
        let mut ontology = Ontology::new();
        ontology.set_samples("book_flight", "destination", vec!["Paris".into()]);
        assert!(ontology.is_complete_for("book_flight", &act_map));
    }
}
