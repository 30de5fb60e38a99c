//! Batch Orchestrator (spec §4.H): fans a run out across every `(intent, mode)` job,
//! bounded to `max_parallelism` concurrent jobs, skipping jobs whose output already
//! exists and continuing past individual job failures. Once every job has finished it
//! hands the persisted sessions to the [`crate::remediator`].
//!
//! The bounded fan-out mirrors [`crate::driver::drive_goals`]'s per-batch
//! `tokio::spawn` shape, gated here by a `tokio::sync::Semaphore` instead of chunking,
//! since jobs (unlike sessions within a job) don't all need to start together.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::Semaphore;

use crate::config::RunConfig;
use crate::driver::{self, BatchOutcome, SimulationContext};
use crate::goal_synth::{Mode, SplitGoal};
use crate::model::{AggregatedReport, DialogActMap, Entity};
use crate::remediator::{self, SessionRecord, DEFAULT_OUT_OF_DOMAIN_FLOOR};

/// Everything needed to drive every session for one intent, split by dev/eval (spec §4.H
/// step 2: jobs are `(intent, mode)` pairs, but dev and eval share the same bot context).
pub struct IntentJob {
    pub intent: String,
    pub context: Arc<SimulationContext>,
    pub dev_goals: Vec<SplitGoal>,
    pub eval_goals: Vec<SplitGoal>,
}

/// One `(intent, mode)` job's result, carrying just enough to feed the remediator (spec
/// §4.G step 1/3).
pub struct JobResult {
    pub intent: String,
    pub mode: Mode,
    pub sessions: Vec<SessionRecord>,
    pub discarded: usize,
}

/// A completed `(intent, mode)` job is detected by the presence of its running-summary
/// file (spec §4.H "Persisted progress is cheap to resume": "a completed (intent, mode)
/// is detected by the presence of its chat-log file").
pub fn job_already_done(sessions_dir: &Path, intent: &str, mode: Mode) -> bool {
    sessions_dir.join(format!("{intent}_{}.summary.log", mode.as_str())).exists()
}

/// Finds the seed utterance that produced `session`'s goal by matching on the probe text
/// carried through unchanged from synthesis to simulation (spec §4.G step 3: "map
/// paraphrases back to seeds"). Falls back to the probe itself if no match is found, e.g.
/// goals supplied outside the normal synthesis path.
fn seed_for_session(goals: &[SplitGoal], session: &crate::model::Session) -> String {
    goals
        .iter()
        .find(|g| g.goal.name == session.goal.name && g.goal.intent_probe() == session.goal.intent_probe())
        .map(|g| g.seed.clone())
        .unwrap_or_else(|| session.goal.intent_probe().unwrap_or_default().to_string())
}

/// Runs every `(intent, mode)` job derived from `jobs`, at most `config.max_parallelism`
/// concurrently (spec §4.H step 3). A job whose summary file already exists is skipped; a
/// job whose task panics is logged and the rest continue (spec §4.H "on job failure the
/// others continue"). Persists each session's chat log and appends to the running summary
/// as it completes.
pub async fn run_all_jobs(jobs: Vec<IntentJob>, config: Arc<RunConfig>) -> Vec<JobResult> {
    let semaphore = Arc::new(Semaphore::new(config.max_parallelism.max(1)));
    let sessions_dir = config.file_paths.sessions_dir.clone();

    let mut mode_jobs = Vec::new();
    for job in jobs {
        if !job.dev_goals.is_empty() {
            mode_jobs.push((job.intent.clone(), Mode::Dev, Arc::clone(&job.context), job.dev_goals));
        }
        if !job.eval_goals.is_empty() {
            mode_jobs.push((job.intent.clone(), Mode::Eval, Arc::clone(&job.context), job.eval_goals));
        }
    }

    let mut handles = Vec::with_capacity(mode_jobs.len());
    for (intent, mode, context, goals) in mode_jobs {
        if job_already_done(&sessions_dir, &intent, mode) {
            tracing::info!(%intent, mode = mode.as_str(), "job already completed, skipping");
            continue;
        }

        let semaphore = Arc::clone(&semaphore);
        let config = Arc::clone(&config);
        let sessions_dir = sessions_dir.clone();
        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore is never closed");
            let span = tracing::info_span!("run_job", %intent, mode = mode.as_str());
            let _enter = span.enter();

            let outcome: BatchOutcome = driver::drive_goals(goals.clone(), context, &config).await;

            let mut records = Vec::with_capacity(outcome.sessions.len());
            for (index, session) in outcome.sessions.iter().enumerate() {
                let seed = seed_for_session(&goals, session);
                if let Err(err) = driver::persist_session(session, &intent, mode.as_str(), index, &sessions_dir) {
                    tracing::error!(%err, "failed to persist session");
                }
                if let Err(err) = driver::persist_session_json(&seed, session, &intent, mode.as_str(), index, &sessions_dir) {
                    tracing::error!(%err, "failed to persist session record");
                }
                if let Err(err) = driver::append_running_summary(session, &intent, mode.as_str(), index, &sessions_dir) {
                    tracing::error!(%err, "failed to append running summary");
                }
                records.push(SessionRecord { seed, session: session.clone() });
            }

            JobResult { intent, mode, sessions: records, discarded: outcome.discarded }
        }));
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle.await {
            Ok(result) => results.push(result),
            Err(join_err) => tracing::error!(%join_err, "job task panicked, continuing with remaining jobs"),
        }
    }
    results
}

/// Runs the whole batch (spec §4.H steps 2-4) and hands the results to the remediator,
/// returning the aggregated report ready to persist as `aggregated_report.json` (spec §6).
/// `anneal_seed` seeds the confusion-matrix reordering's RNG (spec §5 "its RNG must be
/// seedable for determinism").
pub async fn run_pipeline(
    jobs: Vec<IntentJob>,
    config: Arc<RunConfig>,
    act_maps: &HashMap<String, DialogActMap>,
    entities: &HashMap<String, Entity>,
    anneal_seed: u64,
) -> AggregatedReport {
    let intent_check_turn_index = config.intent_check_turn_index;
    let results = run_all_jobs(jobs, config).await;

    let mut per_intent_records: HashMap<String, Vec<SessionRecord>> = HashMap::new();
    for result in &results {
        per_intent_records.entry(result.intent.clone()).or_default().extend(result.sessions.iter().cloned());
    }

    let mut analyses = HashMap::new();
    for result in &results {
        let analysis = remediator::analyze_intent(
            &result.sessions,
            act_maps,
            entities,
            intent_check_turn_index,
            DEFAULT_OUT_OF_DOMAIN_FLOOR,
        );
        analyses.insert((result.intent.clone(), result.mode.as_str().to_string()), analysis);
    }

    let mut labels: Vec<String> = act_maps.keys().cloned().collect();
    labels.sort();

    let confusion_matrix = if labels.len() >= 2 {
        Some(remediator::build_confusion_matrix(
            labels,
            &per_intent_records,
            act_maps,
            intent_check_turn_index,
            DEFAULT_OUT_OF_DOMAIN_FLOOR,
        ))
    } else {
        None
    };

    let mut rng = StdRng::seed_from_u64(anneal_seed);
    remediator::build_aggregated_report(analyses, confusion_matrix, &mut rng)
}
