//! Template NLU (spec §4.A): fuzzy-matches a bot message against the exemplars registered
//! for a dialog, standing in for a trained intent/act classifier.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{DialogAct, DialogActMap};

static DOLLAR_PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$[^$]*\$").unwrap());
static BRACKET_FRAGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[[^\]]*\]").unwrap());

/// Strips `$...$` placeholders and `[...]` bracketed fragments (spec §4.A preprocessing).
pub fn normalize_message(message: &str) -> String {
    let stripped = DOLLAR_PLACEHOLDER.replace_all(message, "");
    BRACKET_FRAGMENT.replace_all(&stripped, "").into_owned()
}

/// The outcome of matching one bot message against a dialog's act map.
#[derive(Debug, Clone, PartialEq)]
pub struct NluMatch {
    pub best_act: Option<DialogAct>,
    pub best_exemplar: Option<String>,
    /// Normalized similarity in `[0, 100]`.
    pub score: f64,
    /// Every act that shares the top score.
    pub ties: Vec<DialogAct>,
}

impl NluMatch {
    /// The empty-act-map failure case of spec §4.A: callers must discard the session.
    fn empty() -> Self {
        Self {
            best_act: None,
            best_exemplar: None,
            score: 0.0,
            ties: Vec::new(),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.best_act.is_none()
    }
}

/// Indel-ratio similarity in `[0, 100]`, the same family of string metric as the original
/// Python implementation's `rapidfuzz.fuzz.ratio`.
pub fn similarity(a: &str, b: &str) -> f64 {
    rapidfuzz::distance::indel::normalized_similarity(a.chars(), b.chars()) * 100.0
}

/// Matches bot message `message` against every exemplar registered in `act_map`. Returns
/// the highest-scoring act, its winning exemplar, the score, and the full tie set (spec
/// §4.A).
pub fn match_message(message: &str, act_map: &DialogActMap) -> NluMatch {
    if act_map.is_empty() {
        return NluMatch::empty();
    }

    let normalized = normalize_message(message);
    let mut best_score = -1.0_f64;
    let mut best_act: Option<DialogAct> = None;
    let mut best_exemplar: Option<String> = None;
    let mut ties: Vec<DialogAct> = Vec::new();

    for act in act_map.acts() {
        let exemplars = act_map.exemplars_for(act);
        for exemplar in exemplars {
            let score = similarity(&normalized, exemplar.as_str());
            if score > best_score {
                best_score = score;
                best_act = Some(act.clone());
                best_exemplar = Some(exemplar.as_str().to_string());
                ties = vec![act.clone()];
            } else if (score - best_score).abs() < f64::EPSILON && !ties.contains(act) {
                ties.push(act.clone());
            }
        }
    }

    match best_act {
        Some(act) => NluMatch {
            best_act: Some(act),
            best_exemplar,
            score: best_score,
            ties,
        },
        None => NluMatch::empty(),
    }
}

/// Re-matches `message` against the union of `intent_success_message` exemplars across
/// every dialog in `act_maps`, used by the cross-intent confusion check (spec §4.E step
/// 3g) and by the remediator's predicted-intent re-derivation (spec §4.G step 2).
pub fn best_intent_across(
    message: &str,
    act_maps: impl IntoIterator<Item = (String, DialogActMap)>,
) -> Vec<(String, f64)> {
    let normalized = normalize_message(message);
    let mut scored = Vec::new();
    for (dialog, act_map) in act_maps {
        let exemplars = act_map.exemplars_for(&DialogAct::IntentSuccessMessage);
        let best = exemplars
            .iter()
            .map(|exemplar| similarity(&normalized, exemplar.as_str()))
            .fold(0.0_f64, f64::max);
        scored.push((dialog, best));
    }
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Utterance;

    fn sample_map() -> DialogActMap {
        let mut map = DialogActMap::new();
        map.register(
            DialogAct::Request {
                slot: "destination".into(),
                entity_type: "city".into(),
            },
            Utterance::new("Where would you like to fly to?"),
        );
        map.register(DialogAct::IntentSuccessMessage, Utterance::new("Sure, I can help with that."));
        map
    }

    #[test]
    fn strips_dollar_and_bracket_fragments() {
        let normalized = normalize_message("Please enter $entity.city$ [optional hint]");
        assert_eq!(normalized, "Please enter  ");
    }

    #[test]
    fn empty_act_map_is_a_failure() {
        let result = match_message("hello", &DialogActMap::new());
        assert!(result.is_failure());
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn matches_closest_exemplar() {
        let map = sample_map();
        let result = match_message("Where would you like to fly?", &map);
        assert!(!result.is_failure());
        assert!(matches!(result.best_act, Some(DialogAct::Request { .. })));
        assert!(result.score > 50.0);
    }

    #[test]
    fn exact_match_scores_100() {
        let map = sample_map();
        let result = match_message("Sure, I can help with that.", &map);
        assert_eq!(result.best_act, Some(DialogAct::IntentSuccessMessage));
        assert!((result.score - 100.0).abs() < 1e-6);
    }
}
