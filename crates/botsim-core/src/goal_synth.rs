//! Goal Synthesizer (spec §4.D): turns paraphrased seed utterances plus ontology samples
//! into simulation goals, split per seed into dev/eval.

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::model::{Goal, Ontology};

/// One paraphrase candidate for a seed utterance, as returned by the external paraphrase
/// collaborator (spec §1 "out of scope", §9 "Paraphrase collaborator interface"). This is
/// what the `paraphrase` CLI command persists as `goals_dir/<intent>_<para_setting>.paraphrases.json`
/// (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParaphraseCandidate {
    pub seed: String,
    pub text: String,
}

/// Which split a synthesized goal belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Dev,
    Eval,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Dev => "dev",
            Mode::Eval => "eval",
        }
    }
}

/// A synthesized goal tagged with the split it was assigned to and the seed it descends
/// from (the remediator needs the seed to map wrong predictions back, spec §4.G step 3).
#[derive(Debug, Clone)]
pub struct SplitGoal {
    pub goal: Goal,
    pub mode: Mode,
    pub seed: String,
}

/// Slot name fragment that forces a deterministic `"no"` value rather than an ontology
/// sample (spec §4.D).
const ANYTHING_ELSE_MARKER: &str = "Anything_Else";

/// Splits `candidates` per seed via an independent Bernoulli(`eval_probability`) draw and
/// builds one [`Goal`] per candidate, filling `inform_slots` from `ontology[intent]` (spec
/// §4.D). `rng` must be seeded by the caller for reproducible runs (spec §9 "the RNG is a
/// seeded, explicitly threaded object").
pub fn synthesize_goals(
    intent: &str,
    candidates: &[ParaphraseCandidate],
    ontology: &Ontology,
    eval_probability: f64,
    rng: &mut StdRng,
) -> Vec<SplitGoal> {
    candidates
        .iter()
        .map(|candidate| {
            let mode = if rng.gen_bool(eval_probability) { Mode::Eval } else { Mode::Dev };
            let goal = build_goal(intent, &candidate.text, ontology, rng);
            SplitGoal {
                goal,
                mode,
                seed: candidate.seed.clone(),
            }
        })
        .collect()
}

fn build_goal(intent: &str, probe: &str, ontology: &Ontology, rng: &mut StdRng) -> Goal {
    let mut goal = Goal::new(intent, probe);
    for slot in ontology.slots_for(intent) {
        let value = if slot.contains(ANYTHING_ELSE_MARKER) {
            "no".to_string()
        } else {
            let samples = ontology.samples_for(intent, slot).unwrap_or(&[]);
            if samples.is_empty() {
                continue;
            }
            let idx = rng.gen_range(0..samples.len());
            samples[idx].clone()
        };
        goal = goal.with_slot(slot.clone(), value);
    }
    goal
}

/// Builds a multi-intent goal by concatenating two single-intent goals (spec §4.D). The
/// integration of the resulting `subsequent_intent` probe into the simulator's policy is
/// flagged as an open question upstream (see DESIGN.md); this function only covers the
/// data-construction contract the spec defines.
pub fn concat_multi_intent(first: Goal, second: &Goal) -> Goal {
    first.concat_multi_intent(second)
}
