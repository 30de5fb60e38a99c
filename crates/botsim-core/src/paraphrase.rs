//! Paraphrase Collaborator (spec §1 "out of scope: the paraphrase/generation backend
//! itself", §9 "Paraphrase collaborator interface"): the seam through which an external
//! paraphrasing system (an LLM, a trained seq2seq model, a human-curated list) supplies
//! alternate phrasings of a seed utterance for the goal synthesizer to consume.
//!
//! Modeled on `llm-toolkit::agent::Agent`: a single async capability method plus a `name()`
//! for diagnostics, so any concrete backend can be swapped in without touching
//! [`crate::goal_synth`].

use async_trait::async_trait;

use crate::error::ConfigError;
use crate::goal_synth::ParaphraseCandidate;

/// Produces paraphrases of a seed utterance. Implementations own their own backend
/// (HTTP call to an LLM, a local model, a fixture) and are expected to return at most
/// `count` candidates, fewer if the backend can't produce that many.
#[async_trait]
pub trait ParaphraseCollaborator: Send + Sync {
    async fn paraphrase(&self, seed: &str, count: usize) -> Result<Vec<String>, ConfigError>;

    fn name(&self) -> &str;
}

/// Runs `collaborator` over every seed and flattens the results into [`ParaphraseCandidate`]s
/// ready for [`crate::goal_synth::synthesize_goals`]. A seed that fails to paraphrase is
/// logged and dropped rather than failing the whole batch (spec §9 "a single seed's failure
/// must not abort the run").
pub async fn collect_candidates(
    collaborator: &dyn ParaphraseCollaborator,
    seeds: &[String],
    candidates_per_seed: usize,
) -> Vec<ParaphraseCandidate> {
    let mut candidates = Vec::new();
    for seed in seeds {
        match collaborator.paraphrase(seed, candidates_per_seed).await {
            Ok(texts) => {
                candidates.extend(texts.into_iter().map(|text| ParaphraseCandidate {
                    seed: seed.clone(),
                    text,
                }));
            }
            Err(err) => {
                tracing::warn!(%seed, %err, collaborator = collaborator.name(), "paraphrase collaborator failed for seed, skipping");
            }
        }
    }
    candidates
}

/// A fixed-output collaborator for tests and offline fixtures: returns the seed itself plus
/// however many canned variants were supplied at construction, round-robining if `count`
/// exceeds what's available.
pub struct StaticParaphraseCollaborator {
    variants: Vec<String>,
}

impl StaticParaphraseCollaborator {
    pub fn new(variants: Vec<String>) -> Self {
        Self { variants }
    }
}

#[async_trait]
impl ParaphraseCollaborator for StaticParaphraseCollaborator {
    async fn paraphrase(&self, seed: &str, count: usize) -> Result<Vec<String>, ConfigError> {
        if self.variants.is_empty() {
            return Ok(vec![seed.to_string()]);
        }
        Ok(self.variants.iter().cycle().take(count).cloned().collect())
    }

    fn name(&self) -> &str {
        "static"
    }
}
