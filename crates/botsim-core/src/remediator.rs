//! Remediator & Confusion-Matrix Engine (spec §4.G): turns persisted sessions for every
//! (intent, mode) into remediation hints, a reordered confusion matrix, and intent
//! clusters.
//!
//! The reordering and clustering math is grounded in the original implementation's
//! `clana` package (simulated-annealing column/row reordering, neighbor-connectivity
//! thresholding); the RNG is the same seeded `rand::rngs::StdRng` pattern used by
//! [`crate::goal_synth`].

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::AnalyzeError;
use crate::model::{
    AggregatedReport, ConfusionMatrix, DialogActMap, Entity, IntentPrediction, NerErrorEntry, NerErrorKind,
    RemediationSuggestion, Session, SessionOutcome,
};
use crate::nlu;

const OUT_OF_DOMAIN: &str = "out_of_domain";

/// The minimum cross-intent similarity score for a re-derivation to count as that intent
/// rather than falling back to `out_of_domain` (spec §4.G step 2).
pub const DEFAULT_OUT_OF_DOMAIN_FLOOR: f64 = 50.0;

/// Default simulated-annealing schedule for confusion-matrix reordering (spec §4.G "Matrix
/// reordering"): "run for ~2·10⁵ steps", cooling by ×0.99 each step. The spec leaves the
/// starting temperature unspecified; 100.0 matches the scale the existing annealing tests
/// already converge well with.
pub const DEFAULT_ANNEAL_STEPS: usize = 200_000;
pub const DEFAULT_ANNEAL_TEMP: f64 = 100.0;
pub const DEFAULT_ANNEAL_COOLING: f64 = 0.99;

/// One session's outcome plus the seed utterance it descends from, the unit the
/// remediator consumes per (intent, mode) (spec §4.G step 1/3). Also the shape persisted to
/// disk as `sessions/<intent>_<mode>_<index>.json` (spec §6) so a `remediate` invocation in
/// a later process can reload what a `simulate` invocation produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub seed: String,
    pub session: Session,
}

/// Re-derives the bot's actual predicted intent for a failed session by re-matching its
/// turn at `intent_check_turn_index + 1` against the union of every dialog's
/// `intent_success_message` exemplars (spec §4.G step 2). Returns `out_of_domain` when the
/// fallback/error messages win, i.e. nothing scores above `out_of_domain_floor`.
pub fn classify_prediction(
    bot_message: &str,
    act_maps: &HashMap<String, DialogActMap>,
    out_of_domain_floor: f64,
) -> String {
    let scored = nlu::best_intent_across(
        bot_message,
        act_maps.iter().map(|(k, v)| (k.clone(), v.clone())),
    );
    match scored.first() {
        Some((intent, score)) if *score >= out_of_domain_floor => intent.clone(),
        _ => OUT_OF_DOMAIN.to_string(),
    }
}

/// The bot message a re-derivation is run against: the turn right after the configured
/// intent-check round, i.e. the bot's reaction to the probe utterance (spec §4.G step 2).
fn bot_message_after_check(session: &Session, intent_check_turn_index: usize) -> Option<&str> {
    session
        .chat_log
        .iter()
        .find(|turn| turn.round_idx == intent_check_turn_index + 1 && turn.speaker == crate::model::Speaker::Bot)
        .map(|turn| turn.utterance.as_str())
}

/// Runs spec §4.G steps 1-5 over every session recorded for one intent: classifies wrong
/// predictions, groups them by seed, and emits remediation suggestions plus cataloged NER
/// failures. Sessions whose outcome is `Success` contribute only to the counts, not to the
/// prediction/suggestion lists.
pub fn analyze_intent(
    records: &[SessionRecord],
    act_maps: &HashMap<String, DialogActMap>,
    entities: &HashMap<String, Entity>,
    intent_check_turn_index: usize,
    out_of_domain_floor: f64,
) -> IntentAnalysis {
    let mut intent_predictions = Vec::new();
    let mut ner_errors: HashMap<(String, NerErrorKind, String), usize> = HashMap::new();
    let mut counts = crate::model::OutcomeCounts::default();

    for record in records {
        match &record.session.outcome {
            SessionOutcome::Success { .. } => counts.success += 1,
            SessionOutcome::IntentError { user_utterance, .. } => {
                counts.intent_error += 1;
                let predicted = bot_message_after_check(&record.session, intent_check_turn_index)
                    .map(|msg| classify_prediction(msg, act_maps, out_of_domain_floor))
                    .unwrap_or_else(|| OUT_OF_DOMAIN.to_string());
                intent_predictions.push(IntentPrediction {
                    seed_utterance: record.seed.clone(),
                    paraphrase: user_utterance.clone(),
                    predicted_intent: predicted,
                });
            }
            SessionOutcome::NerError { slot, error_kind, expected_value, .. } => {
                counts.ner_error += 1;
                *ner_errors
                    .entry((slot.clone(), *error_kind, expected_value.clone()))
                    .or_insert(0) += 1;
            }
            SessionOutcome::OtherError { .. } => counts.other_error += 1,
        }
    }

    let suggestions = build_remediation_suggestions(&intent_predictions);
    let mut ner_entries: Vec<NerErrorEntry> = ner_errors
        .into_iter()
        .map(|((slot, error_kind, expected_value), count)| NerErrorEntry {
            slot,
            error_kind,
            expected_value,
            count,
        })
        .collect();
    ner_entries.sort_by(|a, b| a.slot.cmp(&b.slot).then(b.count.cmp(&a.count)));
    let ner_suggestions = ner_remediation_suggestions(&ner_entries, entities);

    IntentAnalysis {
        counts,
        intent_predictions,
        ner_errors: ner_entries,
        remediation_suggestions: suggestions,
        ner_suggestions,
    }
}

#[derive(Debug, Clone, Default)]
pub struct IntentAnalysis {
    pub counts: crate::model::OutcomeCounts,
    pub intent_predictions: Vec<IntentPrediction>,
    pub ner_errors: Vec<NerErrorEntry>,
    pub remediation_suggestions: Vec<RemediationSuggestion>,
    pub ner_suggestions: Vec<RemediationSuggestion>,
}

/// Spec §4.G step 3-4: group wrongly-classified paraphrases by their originating seed,
/// then per seed: if a single wrong intent accounts for over half the group, suggest
/// moving the seed there; if `out_of_domain` does, suggest filtering it out and augmenting
/// with closer paraphrases; otherwise fall back to a generic review suggestion.
fn build_remediation_suggestions(predictions: &[IntentPrediction]) -> Vec<RemediationSuggestion> {
    let mut by_seed: HashMap<&str, Vec<&IntentPrediction>> = HashMap::new();
    for prediction in predictions {
        by_seed.entry(prediction.seed_utterance.as_str()).or_default().push(prediction);
    }

    let mut seeds: Vec<&str> = by_seed.keys().copied().collect();
    seeds.sort();

    seeds
        .into_iter()
        .map(|seed| {
            let group = &by_seed[seed];
            let total = group.len();
            let mut tally: HashMap<&str, usize> = HashMap::new();
            for prediction in group {
                *tally.entry(prediction.predicted_intent.as_str()).or_insert(0) += 1;
            }
            let (top_intent, top_count) = tally
                .into_iter()
                .max_by_key(|(_, count)| *count)
                .expect("non-empty group always has a majority candidate");

            let suggestion = if top_count * 2 > total && top_intent == OUT_OF_DOMAIN {
                format!(
                    "{}/{} paraphrases of '{seed}' fell out of domain; filter this seed and augment with closer paraphrases",
                    top_count, total
                )
            } else if top_count * 2 > total {
                format!(
                    "{}/{} paraphrases of '{seed}' were classified as '{top_intent}'; consider moving this seed there",
                    top_count, total
                )
            } else {
                format!("'{seed}' produced mixed misclassifications across {total} paraphrases; review individually")
            };

            RemediationSuggestion {
                seed_utterance: seed.to_string(),
                suggestion,
            }
        })
        .collect()
}

/// Spec §4.G step 5: a templated suggestion per slot depending on how its entity is
/// extracted.
fn ner_remediation_suggestions(entries: &[NerErrorEntry], entities: &HashMap<String, Entity>) -> Vec<RemediationSuggestion> {
    entries
        .iter()
        .map(|entry| {
            let suggestion = match entities.get(&entry.slot) {
                Some(Entity::Regex { pattern }) => format!(
                    "slot '{}' missed/mismatched '{}' {} time(s) under pattern `{pattern}`; tighten or broaden the regex",
                    entry.slot, entry.expected_value, entry.count
                ),
                Some(Entity::ValueList { .. }) => format!(
                    "slot '{}' missed/mismatched '{}' {} time(s); extend the value list to cover this value",
                    entry.slot, entry.expected_value, entry.count
                ),
                Some(Entity::System { kind }) => format!(
                    "slot '{}' ({:?} system entity) missed/mismatched '{}' {} time(s); switch to model-based extraction",
                    entry.slot, kind, entry.expected_value, entry.count
                ),
                None => format!(
                    "slot '{}' missed/mismatched '{}' {} time(s); no extraction rule found for this slot",
                    entry.slot, entry.expected_value, entry.count
                ),
            };
            RemediationSuggestion {
                seed_utterance: entry.slot.clone(),
                suggestion,
            }
        })
        .collect()
}

/// Spec §4.G step 6: folds every intent's sessions into one M×M confusion matrix, rows
/// and columns both indexed by `labels` in the given order. `Success` rows record
/// truth == prediction == the session's own intent; `IntentError` rows record the
/// re-derived prediction (including `out_of_domain` when that's not itself a label, which
/// is simply skipped).
pub fn build_confusion_matrix(
    labels: Vec<String>,
    per_intent: &HashMap<String, Vec<SessionRecord>>,
    act_maps: &HashMap<String, DialogActMap>,
    intent_check_turn_index: usize,
    out_of_domain_floor: f64,
) -> ConfusionMatrix {
    let mut cm = ConfusionMatrix::new(labels);
    for (intent, records) in per_intent {
        for record in records {
            match &record.session.outcome {
                SessionOutcome::Success { .. } => cm.record(intent, intent),
                SessionOutcome::IntentError { .. } => {
                    let predicted = bot_message_after_check(&record.session, intent_check_turn_index)
                        .map(|msg| classify_prediction(msg, act_maps, out_of_domain_floor))
                        .unwrap_or_else(|| OUT_OF_DOMAIN.to_string());
                    cm.record(intent, &predicted);
                }
                _ => {}
            }
        }
    }
    cm
}

/// Assembles the run-level report: per-(intent, mode) analyses plus the confusion matrix,
/// reordered by [`simulated_annealing`] using [`DEFAULT_ANNEAL_STEPS`]/`_TEMP`/`_COOLING`
/// (spec §4.G "Matrix reordering"). A matrix with fewer than 2 labels has nothing to
/// permute and is stored unchanged.
pub fn build_aggregated_report(
    analyses: HashMap<(String, String), IntentAnalysis>,
    confusion_matrix: Option<ConfusionMatrix>,
    rng: &mut StdRng,
) -> AggregatedReport {
    let mut report = AggregatedReport::default();
    for ((intent, mode), analysis) in analyses {
        let entry = report.entry_mut(&intent, &mode);
        entry.counts = analysis.counts;
        entry.intent_predictions = analysis.intent_predictions;
        entry.ner_errors = analysis.ner_errors;
        entry.remediation_suggestions = analysis
            .remediation_suggestions
            .into_iter()
            .chain(analysis.ner_suggestions)
            .collect();
    }
    report.confusion_matrix = confusion_matrix.map(|cm| {
        if cm.n() < 2 {
            return cm;
        }
        let result = simulated_annealing(&cm.counts, DEFAULT_ANNEAL_STEPS, DEFAULT_ANNEAL_TEMP, DEFAULT_ANNEAL_COOLING, rng);
        reorder_confusion_matrix(&cm, &result)
    });
    report
}

/// Skips a missing per-session file with a warning rather than failing the whole
/// remediation run (spec §4.G "Failure semantics"). Used by a `remediate` invocation that
/// reloads sessions a prior `simulate` invocation persisted via
/// [`crate::driver::persist_session_json`].
pub fn load_session_or_warn(path: &std::path::Path) -> Result<SessionRecord, AnalyzeError> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "session file missing, skipping");
        return Err(AnalyzeError::MissingSessionFile(path.display().to_string()));
    }
    let raw = std::fs::read_to_string(path).map_err(|e| AnalyzeError::UnparseableSummary(e.to_string()))?;
    serde_json::from_str(&raw).map_err(|e| AnalyzeError::UnparseableSummary(e.to_string()))
}

// --- Matrix reordering (simulated annealing), grounded in the original `clana.optimize`
// module. ---

/// `W[i][j] = |i-j| + 0.01*(i+j)` for `i != j`, zero on the diagonal. The `0.01` term
/// breaks ties between otherwise-equivalent permutations so the optimum is unique.
pub fn calculate_weight_matrix(n: usize) -> Vec<Vec<f64>> {
    let mut weights = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..n {
            if i == j {
                continue;
            }
            weights[i][j] = (i as f64 - j as f64).abs() + 0.01 * (i + j) as f64;
        }
    }
    weights
}

/// `S(C, W) = sum_ij C[i][j] * W[i][j]`: how far the matrix's mass sits from the diagonal.
pub fn calculate_score(cm: &[Vec<i64>], weights: &[Vec<f64>]) -> f64 {
    let n = cm.len();
    let mut score = 0.0;
    for i in 0..n {
        for j in 0..n {
            score += cm[i][j] as f64 * weights[i][j];
        }
    }
    score
}

/// Applies a permutation to both rows and columns symmetrically: `cm'[i][j] = cm[perm[i]][perm[j]]`.
pub fn apply_permutation(cm: &[Vec<i64>], perm: &[usize]) -> Vec<Vec<i64>> {
    let n = cm.len();
    let mut out = vec![vec![0i64; n]; n];
    for i in 0..n {
        for j in 0..n {
            out[i][j] = cm[perm[i]][perm[j]];
        }
    }
    out
}

/// One proposal: either swap two positions, or move a contiguous block elsewhere. Blocks
/// don't make sense for `n < 3`, so those always swap (mirrors the original
/// `generate_permutation`'s early-out).
fn generate_permutation(n: usize, current_perm: &[usize], rng: &mut StdRng) -> Vec<usize> {
    let make_swap = n < 3 || rng.gen_bool(0.5);
    let mut perm = current_perm.to_vec();
    if make_swap {
        let i = rng.gen_range(0..n);
        let mut j = rng.gen_range(0..n);
        while j == i {
            j = rng.gen_range(0..n);
        }
        perm.swap(i, j);
    } else {
        let from_start = rng.gen_range(0..n.saturating_sub(2));
        let from_end = rng.gen_range((from_start + 1)..(n - 1));
        let mut insert_pos = rng.gen_range(0..n);
        while insert_pos >= from_start && insert_pos <= from_end {
            insert_pos = rng.gen_range(0..n);
        }
        move_block(&mut perm, from_start, from_end, insert_pos);
    }
    perm
}

/// Moves `perm[from_start..=from_end]` to sit just before (or after) `insert_pos`,
/// shifting the elements in between to close the gap.
fn move_block(perm: &mut Vec<usize>, from_start: usize, from_end: usize, insert_pos: usize) {
    let block: Vec<usize> = perm[from_start..=from_end].to_vec();
    if insert_pos > from_end {
        let shifted: Vec<usize> = perm[(from_end + 1)..=insert_pos].to_vec();
        let mut cursor = from_start;
        for v in shifted {
            perm[cursor] = v;
            cursor += 1;
        }
        for v in block {
            perm[cursor] = v;
            cursor += 1;
        }
    } else {
        let shifted: Vec<usize> = perm[insert_pos..from_start].to_vec();
        let mut cursor = insert_pos;
        for v in block {
            perm[cursor] = v;
            cursor += 1;
        }
        for v in shifted {
            perm[cursor] = v;
            cursor += 1;
        }
    }
}

/// The result of one annealing run: the best matrix seen and the permutation that
/// produced it (identity-indexed into the matrix passed to [`simulated_annealing`]).
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    pub cm: Vec<Vec<i64>>,
    pub perm: Vec<usize>,
    pub score: f64,
}

/// Reorders `cm` to pull large off-diagonal mass toward the diagonal (spec §4.G "Matrix
/// reordering"): propose a swap or block-move each step, accept if it improves the score
/// or, with probability `exp(-delta/temp)`, even if it doesn't; cool `temp` by
/// `cooling_factor` every step regardless of acceptance (an Open Question the original
/// resolves this way, see DESIGN.md).
pub fn simulated_annealing(
    cm: &[Vec<i64>],
    steps: usize,
    mut temp: f64,
    cooling_factor: f64,
    rng: &mut StdRng,
) -> OptimizationResult {
    let n = cm.len();
    let weights = calculate_weight_matrix(n);
    let identity: Vec<usize> = (0..n).collect();

    let mut current_cm = apply_permutation(cm, &identity);
    let mut current_perm = identity.clone();
    let mut current_score = calculate_score(&current_cm, &weights);

    let mut best_cm = current_cm.clone();
    let mut best_perm = current_perm.clone();
    let mut best_score = current_score;

    if n < 2 {
        return OptimizationResult { cm: best_cm, perm: best_perm, score: best_score };
    }

    for _ in 0..steps {
        let proposed_perm = generate_permutation(n, &current_perm, rng);
        let proposed_cm = apply_permutation(cm, &proposed_perm);
        let proposed_score = calculate_score(&proposed_cm, &weights);

        let chance: f64 = rng.gen_range(0.0..1.0);
        temp *= cooling_factor;
        let accept_threshold = (-(proposed_score - current_score) / temp).exp().min(1.0);

        if chance <= accept_threshold {
            if proposed_score < best_score {
                best_score = proposed_score;
                best_cm = proposed_cm.clone();
                best_perm = proposed_perm.clone();
            }
            current_score = proposed_score;
            current_cm = proposed_cm;
            current_perm = proposed_perm;
        }
    }

    OptimizationResult { cm: best_cm, perm: best_perm, score: best_score }
}

/// Reorders a [`ConfusionMatrix`]'s labels and counts in place per `perm`.
pub fn reorder_confusion_matrix(cm: &ConfusionMatrix, result: &OptimizationResult) -> ConfusionMatrix {
    let labels = result.perm.iter().map(|&i| cm.labels[i].clone()).collect();
    ConfusionMatrix {
        labels,
        counts: result.cm.clone(),
    }
}

// --- Clustering, grounded in `clana.clustering`. ---

/// `c_i = C[i][i+1] + C[i+1][i]` for every adjacent pair on the (already reordered) matrix.
pub fn neighboring_connectivity(cm: &ConfusionMatrix) -> Vec<i64> {
    let n = cm.n();
    (0..n.saturating_sub(1))
        .map(|i| cm.counts[i][i + 1] + cm.counts[i + 1][i])
        .collect()
}

/// The connectivity value below which a configured `percentage` of neighbor pairs falls,
/// used as the cluster-boundary threshold (spec §4.G "Clustering").
pub fn find_threshold(connectivity: &[i64], percentage: f64) -> i64 {
    let mut sorted = connectivity.to_vec();
    sorted.sort_unstable();
    let n = sorted.len();
    if n == 0 {
        return 0;
    }
    let idx = ((percentage * n as f64) as usize).min(n - 1);
    sorted[idx]
}

/// Inserts a cluster boundary between `i` and `i+1` wherever their connectivity falls
/// below `threshold`, then groups the labels accordingly. Skipped entirely when there are
/// fewer than 3 labels (spec §4.G "Failure semantics").
pub fn cluster_labels(cm: &ConfusionMatrix, threshold: i64) -> Vec<Vec<String>> {
    if cm.n() < 3 {
        return cm.labels.iter().map(|l| vec![l.clone()]).collect();
    }
    let connectivity = neighboring_connectivity(cm);
    let mut groups: Vec<Vec<String>> = Vec::new();
    let mut current = vec![cm.labels[0].clone()];
    for (i, &c) in connectivity.iter().enumerate() {
        if c < threshold {
            groups.push(std::mem::take(&mut current));
        }
        current.push(cm.labels[i + 1].clone());
    }
    groups.push(current);
    groups
}
