//! Per-dialog dialog-act maps: the template NLU's exemplar store (spec §3, §4.C).

use super::dialog_act::DialogAct;
use super::utterance::Utterance;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;

/// For one dialog, the mapping from a dialog act to its exemplar bot messages. Serializes
/// as a JSON object keyed by [`DialogAct::act_key`] (e.g. `request_destination@city`,
/// `intent_success_message`), the same vocabulary spec §6 uses for persisted act maps —
/// plain `#[derive(Serialize)]` can't do this directly since JSON object keys must be
/// strings and `DialogAct` is a tagged enum, not a string.
#[derive(Debug, Clone, Default)]
pub struct DialogActMap {
    exemplars: HashMap<DialogAct, Vec<Utterance>>,
}

impl Serialize for DialogActMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let keyed: HashMap<String, &Vec<Utterance>> =
            self.exemplars.iter().map(|(act, exemplars)| (act.act_key(), exemplars)).collect();
        keyed.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DialogActMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let keyed: HashMap<String, Vec<Utterance>> = HashMap::deserialize(deserializer)?;
        let mut exemplars = HashMap::with_capacity(keyed.len());
        for (key, value) in keyed {
            let act = DialogAct::parse_key(&key).ok_or_else(|| D::Error::custom(format!("unrecognized dialog act key '{key}'")))?;
            exemplars.insert(act, value);
        }
        Ok(DialogActMap { exemplars })
    }
}

impl DialogActMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.exemplars.values().all(|v| v.is_empty())
    }

    /// Registers `message` under `act`, appending if the act is already present.
    pub fn register(&mut self, act: DialogAct, message: Utterance) {
        self.exemplars.entry(act).or_default().push(message);
    }

    pub fn register_many(&mut self, act: DialogAct, messages: impl IntoIterator<Item = Utterance>) {
        self.exemplars.entry(act).or_default().extend(messages);
    }

    pub fn exemplars_for(&self, act: &DialogAct) -> &[Utterance] {
        self.exemplars.get(act).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn acts(&self) -> impl Iterator<Item = &DialogAct> {
        self.exemplars.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DialogAct, &[Utterance])> {
        self.exemplars.iter().map(|(a, v)| (a, v.as_slice()))
    }

    /// Merges `other`'s exemplars into self, deduplicating identical strings per act.
    /// Used by the graph-reachability aggregation of spec §4.C step 4.
    pub fn merge(&mut self, other: &DialogActMap) {
        for (act, exemplars) in other.iter() {
            let entry = self.exemplars.entry(act.clone()).or_default();
            for ex in exemplars {
                if !entry.contains(ex) {
                    entry.push(ex.clone());
                }
            }
        }
    }

    /// Invariant check (spec §3): exemplars for `dialog_success_message` and
    /// `intent_success_message` must be present and non-empty.
    pub fn has_required_success_acts(&self) -> bool {
        !self.exemplars_for(&DialogAct::IntentSuccessMessage).is_empty()
            && !self.exemplars_for(&DialogAct::DialogSuccessMessage).is_empty()
    }

    /// All `request_<slot>` acts registered in this map, with their entity types.
    pub fn request_slots(&self) -> Vec<(&str, &str)> {
        self.exemplars
            .keys()
            .filter_map(|act| match act {
                DialogAct::Request { slot, entity_type } => Some((slot.as_str(), entity_type.as_str())),
                _ => None,
            })
            .collect()
    }
}

/// The full collection of per-dialog act maps for one bot version.
pub type DialogActMapSet = HashMap<String, DialogActMap>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_round_trip_uses_canonical_act_keys() {
        let mut map = DialogActMap::new();
        map.register(
            DialogAct::Request { slot: "destination".into(), entity_type: "city".into() },
            Utterance::new("Where to?"),
        );
        map.register(DialogAct::DialogSuccessMessage, Utterance::new("All set!"));

        let json = serde_json::to_value(&map).unwrap();
        assert_eq!(json["request_destination@city"][0], "Where to?");

        let round_tripped: DialogActMap = serde_json::from_value(json).unwrap();
        assert_eq!(
            round_tripped.exemplars_for(&DialogAct::Request { slot: "destination".into(), entity_type: "city".into() }),
            map.exemplars_for(&DialogAct::Request { slot: "destination".into(), entity_type: "city".into() }),
        );
    }

    #[test]
    fn unrecognized_act_key_fails_to_deserialize() {
        let result: Result<DialogActMap, _> = serde_json::from_str(r#"{"not_a_real_act": ["hi"]}"#);
        assert!(result.is_err());
    }

    #[test]
    fn merge_deduplicates_exemplars() {
        let mut a = DialogActMap::new();
        a.register(DialogAct::SmallTalk, Utterance::new("hi"));
        let mut b = DialogActMap::new();
        b.register(DialogAct::SmallTalk, Utterance::new("hi"));
        b.register(DialogAct::SmallTalk, Utterance::new("how are you"));
        a.merge(&b);
        assert_eq!(a.exemplars_for(&DialogAct::SmallTalk).len(), 2);
    }

    #[test]
    fn required_success_acts_invariant() {
        let mut m = DialogActMap::new();
        assert!(!m.has_required_success_acts());
        m.register(DialogAct::IntentSuccessMessage, Utterance::new("Got it!"));
        assert!(!m.has_required_success_acts());
        m.register(DialogAct::DialogSuccessMessage, Utterance::new("All done!"));
        assert!(m.has_required_success_acts());
    }

    #[test]
    fn request_slots_lists_all_registered_requests() {
        let mut m = DialogActMap::new();
        m.register(
            DialogAct::Request {
                slot: "destination".into(),
                entity_type: "city".into(),
            },
            Utterance::new("Where to?"),
        );
        m.register(
            DialogAct::Request {
                slot: "date".into(),
                entity_type: "date".into(),
            },
            Utterance::new("When?"),
        );
        let mut slots = m.request_slots();
        slots.sort();
        assert_eq!(slots, vec![("date", "date"), ("destination", "city")]);
    }
}
