//! The remediator's output artifacts (spec §3, §4.G).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::session::NerErrorKind;

/// Counts by outcome variant for one (intent, mode) slice (spec §3, §8 "Driver accounting").
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub success: usize,
    pub intent_error: usize,
    pub ner_error: usize,
    pub other_error: usize,
}

impl OutcomeCounts {
    pub fn total(&self) -> usize {
        self.success + self.intent_error + self.ner_error + self.other_error
    }
}

/// What the bot actually classified a wrongly-handled paraphrase as (spec §4.G step 2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentPrediction {
    pub seed_utterance: String,
    pub paraphrase: String,
    pub predicted_intent: String,
}

/// One cataloged NER failure, grouped by slot and error kind (spec §4.G step 5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NerErrorEntry {
    pub slot: String,
    pub error_kind: NerErrorKind,
    pub expected_value: String,
    pub count: usize,
}

/// A human-readable remediation suggestion for one seed utterance (spec §4.G step 4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationSuggestion {
    pub seed_utterance: String,
    pub suggestion: String,
}

/// A square integer confusion matrix: rows are truth intents, columns are predicted
/// intents, both indexed by `labels` (spec §3, §4.G step 6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub labels: Vec<String>,
    pub counts: Vec<Vec<i64>>,
}

impl ConfusionMatrix {
    pub fn new(labels: Vec<String>) -> Self {
        let n = labels.len();
        Self {
            labels,
            counts: vec![vec![0; n]; n],
        }
    }

    pub fn n(&self) -> usize {
        self.labels.len()
    }

    pub fn record(&mut self, truth: &str, predicted: &str) {
        let Some(i) = self.labels.iter().position(|l| l == truth) else {
            return;
        };
        let Some(j) = self.labels.iter().position(|l| l == predicted) else {
            return;
        };
        self.counts[i][j] += 1;
    }

    pub fn total_mass(&self) -> i64 {
        self.counts.iter().flatten().sum()
    }

    pub fn trace(&self) -> i64 {
        (0..self.n()).map(|i| self.counts[i][i]).sum()
    }

    pub fn recall(&self, i: usize) -> f64 {
        let row_sum: i64 = self.counts[i].iter().sum();
        if row_sum == 0 {
            0.0
        } else {
            self.counts[i][i] as f64 / row_sum as f64
        }
    }

    pub fn precision(&self, j: usize) -> f64 {
        let col_sum: i64 = self.counts.iter().map(|row| row[j]).sum();
        if col_sum == 0 {
            0.0
        } else {
            self.counts[j][j] as f64 / col_sum as f64
        }
    }

    pub fn f1(&self, i: usize) -> f64 {
        let p = self.precision(i);
        let r = self.recall(i);
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }
}

/// Per-(intent, mode) aggregated diagnostics produced by the remediator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntentModeReport {
    pub counts: OutcomeCounts,
    pub intent_predictions: Vec<IntentPrediction>,
    pub ner_errors: Vec<NerErrorEntry>,
    pub remediation_suggestions: Vec<RemediationSuggestion>,
}

/// The full, run-level aggregated report (spec §3, §7 "always produces
/// `aggregated_report.json`").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregatedReport {
    /// Keyed by `"<intent>:<mode>"`.
    pub per_intent_mode: HashMap<String, IntentModeReport>,
    pub confusion_matrix: Option<ConfusionMatrix>,
}

impl AggregatedReport {
    pub fn key(intent: &str, mode: &str) -> String {
        format!("{intent}:{mode}")
    }

    pub fn entry_mut(&mut self, intent: &str, mode: &str) -> &mut IntentModeReport {
        self.per_intent_mode.entry(Self::key(intent, mode)).or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confusion_matrix_records_and_aggregates() {
        let mut cm = ConfusionMatrix::new(vec!["a".into(), "b".into()]);
        cm.record("a", "a");
        cm.record("a", "b");
        cm.record("b", "b");
        assert_eq!(cm.total_mass(), 3);
        assert_eq!(cm.trace(), 2);
        assert_eq!(cm.recall(0), 0.5);
        assert_eq!(cm.precision(1), 1.0);
    }

    #[test]
    fn driver_accounting_invariant_holds() {
        let counts = OutcomeCounts {
            success: 3,
            intent_error: 1,
            ner_error: 2,
            other_error: 0,
        };
        assert_eq!(counts.total(), 6);
    }
}
