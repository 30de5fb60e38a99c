//! Simulation Driver (spec §4.F): runs many [`Simulator`] sessions against a live
//! [`BotTransport`] endpoint, in resource-reset batches, persisting chat logs and a running
//! summary as it goes.
//!
//! The concurrent fan-out within a batch mirrors
//! `llm-toolkit::orchestrator::parallel_orchestrator`'s `tokio::spawn`-per-unit shape: each
//! goal in a batch runs as its own task, the batch is joined before the next one starts, and
//! every task logs through its own `tracing::info_span!`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::RunConfig;
use crate::error::{ConfigError, TransportError};
use crate::goal_synth::SplitGoal;
use crate::model::{DialogActMap, DialogTurn, Session, Speaker};
use crate::nlg::TemplateBank;
use crate::nlu;
use crate::simulator::{other_intents_excluding, RoundOutcome, Simulator, SimulatorConfig};
use crate::transport::BotTransport;

/// Why a session was discarded rather than recorded as an outcome (spec §4.F "Discard
/// rules"): these never reach the aggregated report, they're dropped entirely.
#[derive(Debug, Clone)]
pub enum DiscardReason {
    /// The bot never produced an initial message for this session.
    NoInitialMessage,
    /// Three consecutive transport failures for the same session (spec §4.F).
    TransportUnavailable,
    /// The NLU matched nothing at all on the intent-check turn — too little signal to
    /// classify, so the session is dropped instead of miscounted (spec §4.F).
    NluFailureAtIntentCheck,
    /// The act map itself was malformed (spec §4.E step 3d).
    Protocol(ConfigError),
}

/// Everything one session needs that's constant across a whole (intent, mode) job: the
/// transport, the target dialog's act map, every other intent's map (for cross-intent
/// confusion), the NLG template bank, and the run's simulator knobs.
pub struct SimulationContext {
    pub transport: Arc<dyn BotTransport>,
    pub intent: String,
    pub act_map: DialogActMap,
    pub all_act_maps: Arc<std::collections::HashMap<String, DialogActMap>>,
    pub templates: Arc<TemplateBank>,
    pub simulator_config: SimulatorConfig,
    pub bot_initiated: bool,
}

/// Runs a single conversation for `goal` against the context's transport (spec §4.F
/// per-session loop).
pub async fn run_session(goal: &SplitGoal, ctx: &SimulationContext) -> Result<Session, DiscardReason> {
    let other_intents = other_intents_excluding(&ctx.all_act_maps, &ctx.intent);
    let mut simulator = Simulator::new(
        goal.goal.clone(),
        ctx.intent.clone(),
        ctx.act_map.clone(),
        other_intents,
        (*ctx.templates).clone(),
        ctx.simulator_config,
        ctx.bot_initiated,
    );

    let session_handle = ctx
        .transport
        .open_session()
        .await
        .map_err(|_| DiscardReason::TransportUnavailable)?;

    let (first_utterance, first_annotated) = simulator.opening_turn().map_err(DiscardReason::Protocol)?;
    let mut chat_log = vec![DialogTurn {
        speaker: Speaker::User,
        round_idx: 0,
        utterance: first_utterance.clone(),
        semantic_frame: Some(first_annotated),
    }];

    let mut pending_utterance = first_utterance;
    let mut consecutive_failures = 0u32;

    loop {
        let reply = match ctx.transport.send(&session_handle, &pending_utterance).await {
            Ok(reply) => {
                consecutive_failures = 0;
                reply
            }
            Err(TransportError::NoInitialMessage) if simulator.round() == 0 => {
                return Err(DiscardReason::NoInitialMessage);
            }
            Err(_) => {
                consecutive_failures += 1;
                if consecutive_failures >= 3 {
                    let _ = ctx.transport.close_session(&session_handle).await;
                    return Err(DiscardReason::TransportUnavailable);
                }
                continue;
            }
        };

        if reply.messages.is_empty() {
            let _ = ctx.transport.close_session(&session_handle).await;
            return Err(DiscardReason::NoInitialMessage);
        }

        let next_round_is_critical = simulator.round() + 1 == ctx.simulator_config.intent_check_turn_index;
        if next_round_is_critical {
            let matched_anything = reply
                .messages
                .iter()
                .any(|m| nlu::match_message(m, &ctx.act_map).best_act.is_some());
            if !matched_anything {
                let _ = ctx.transport.close_session(&session_handle).await;
                return Err(DiscardReason::NluFailureAtIntentCheck);
            }
        }

        for message in &reply.messages {
            chat_log.push(DialogTurn {
                speaker: Speaker::Bot,
                round_idx: simulator.round() + 1,
                utterance: message.clone(),
                semantic_frame: None,
            });
        }

        match simulator.receive_round(&reply.messages) {
            Ok(RoundOutcome::Continue { utterance, annotated }) => {
                chat_log.push(DialogTurn {
                    speaker: Speaker::User,
                    round_idx: simulator.round(),
                    utterance: utterance.clone(),
                    semantic_frame: Some(annotated),
                });
                pending_utterance = utterance;
            }
            Ok(RoundOutcome::Terminated(outcome)) => {
                let _ = ctx.transport.close_session(&session_handle).await;
                return Ok(Session {
                    goal: simulator.goal().clone(),
                    chat_log,
                    outcome,
                });
            }
            Err(err) => {
                let _ = ctx.transport.close_session(&session_handle).await;
                return Err(DiscardReason::Protocol(err));
            }
        }
    }
}

/// One batch's results: every session that completed plus a tally of discards by reason,
/// kept for the running summary rather than the individual discarded goals themselves (spec
/// §4.F "discarded sessions are not retried or persisted").
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub sessions: Vec<Session>,
    pub discarded: usize,
}

/// Drives every goal in `goals`, in chunks of `config.batch_size` (spec §4.F "batches of 25,
/// a resource-reset checkpoint between each"). Within a batch, sessions run concurrently via
/// `tokio::spawn`; batches themselves run sequentially so the checkpoint is meaningful.
pub async fn drive_goals(goals: Vec<SplitGoal>, ctx: Arc<SimulationContext>, config: &RunConfig) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();

    for (batch_idx, batch) in goals.chunks(config.batch_size).enumerate() {
        let span = tracing::info_span!("simulate_batch", batch = batch_idx, size = batch.len());
        let _enter = span.enter();

        let mut handles = Vec::with_capacity(batch.len());
        for goal in batch {
            let goal = goal.clone();
            let ctx = Arc::clone(&ctx);
            handles.push(tokio::spawn(async move {
                let result = run_session(&goal, &ctx).await;
                (goal, result)
            }));
        }

        for handle in handles {
            match handle.await {
                Ok((_goal, Ok(session))) => outcome.sessions.push(session),
                Ok((goal, Err(reason))) => {
                    tracing::warn!(seed = %goal.seed, reason = ?reason, "session discarded");
                    outcome.discarded += 1;
                }
                Err(join_err) => {
                    tracing::error!(%join_err, "session task panicked");
                    outcome.discarded += 1;
                }
            }
        }

        tracing::debug!(batch = batch_idx, "batch checkpoint reached");
    }

    outcome
}

/// Persists one session's chat log plus its terminal summary line (spec §6's
/// `sessions/<intent>_<mode>_<index>.log` layout).
pub fn persist_session(session: &Session, intent: &str, mode: &str, index: usize, sessions_dir: &Path) -> Result<PathBuf, ConfigError> {
    std::fs::create_dir_all(sessions_dir).map_err(|source| ConfigError::Io {
        path: sessions_dir.display().to_string(),
        source,
    })?;

    let path = sessions_dir.join(format!("{intent}_{mode}_{index}.log"));
    let mut lines: Vec<String> = session.chat_log.iter().map(DialogTurn::format_log_line).collect();
    lines.push(session.outcome.format_summary_line(index));

    std::fs::write(&path, lines.join("\n")).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(path)
}

/// Persists one session's full structured record as `sessions/<intent>_<mode>_<index>.json`
/// (spec §6 `logs_*_sessions.json` artifact), alongside the human-readable text log (spec
/// §6's `{goal, chat_log}` shape), so a `remediate` invocation running in a separate process
/// can reload it via [`crate::remediator::load_session_or_warn`].
pub fn persist_session_json(seed: &str, session: &Session, intent: &str, mode: &str, index: usize, sessions_dir: &Path) -> Result<PathBuf, ConfigError> {
    std::fs::create_dir_all(sessions_dir).map_err(|source| ConfigError::Io {
        path: sessions_dir.display().to_string(),
        source,
    })?;

    let path = sessions_dir.join(format!("{intent}_{mode}_{index}.json"));
    let record = crate::remediator::SessionRecord {
        seed: seed.to_string(),
        session: session.clone(),
    };
    let body = serde_json::to_string_pretty(&record).map_err(|source| ConfigError::Json {
        path: path.display().to_string(),
        source,
    })?;
    std::fs::write(&path, body).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(path)
}

/// Appends one outcome's summary line to the running per-(intent, mode) summary file (spec
/// §6: "a running summary readable while the batch is still in progress").
pub fn append_running_summary(session: &Session, intent: &str, mode: &str, index: usize, sessions_dir: &Path) -> Result<(), ConfigError> {
    use std::io::Write;

    std::fs::create_dir_all(sessions_dir).map_err(|source| ConfigError::Io {
        path: sessions_dir.display().to_string(),
        source,
    })?;
    let path = sessions_dir.join(format!("{intent}_{mode}.summary.log"));
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
    writeln!(file, "{}", session.outcome.format_summary_line(index)).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goal_synth::Mode;
    use crate::model::{DialogAct, Goal, Utterance};
    use crate::nlg::NlgTemplate;
    use crate::transport::{BotReply, SessionHandle};
    use async_trait::async_trait;
    use std::collections::{BTreeSet, HashMap};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct ScriptedTransport {
        replies: Vec<Vec<String>>,
        call: AtomicUsize,
    }

    #[async_trait]
    impl BotTransport for ScriptedTransport {
        async fn open_session(&self) -> Result<SessionHandle, TransportError> {
            Ok(SessionHandle("scripted".into()))
        }

        async fn send(&self, _session: &SessionHandle, _utterance: &str) -> Result<BotReply, TransportError> {
            let idx = self.call.fetch_add(1, Ordering::SeqCst);
            match self.replies.get(idx) {
                Some(messages) => Ok(BotReply { messages: messages.clone() }),
                None => Ok(BotReply { messages: vec![] }),
            }
        }

        async fn close_session(&self, _session: &SessionHandle) -> Result<(), TransportError> {
            Ok(())
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn templates() -> TemplateBank {
        let mut bank = TemplateBank::new();
        bank.add(NlgTemplate {
            action: "inform".into(),
            inform_slots: ["intent".to_string()].into_iter().collect(),
            request_slots: BTreeSet::new(),
            text: "${intent}".into(),
        });
        bank
    }

    fn act_map() -> DialogActMap {
        let mut map = DialogActMap::new();
        map.register(DialogAct::DialogSuccessMessage, Utterance::new("All done!"));
        map.register(DialogAct::IntentSuccessMessage, Utterance::new("Sure thing."));
        map
    }

    fn context(transport: ScriptedTransport) -> SimulationContext {
        SimulationContext {
            transport: Arc::new(transport),
            intent: "book_flight".into(),
            act_map: act_map(),
            all_act_maps: Arc::new(HashMap::new()),
            templates: Arc::new(templates()),
            simulator_config: SimulatorConfig { max_round_num: 20, intent_check_turn_index: 1 },
            bot_initiated: false,
        }
    }

    #[tokio::test]
    async fn session_reaching_dialog_success_is_recorded() {
        let transport = ScriptedTransport {
            replies: vec![vec!["Sure thing.".to_string()], vec!["All done!".to_string()]],
            call: AtomicUsize::new(0),
        };
        let ctx = context(transport);
        let goal = SplitGoal {
            goal: Goal::new("book_flight", "I want to fly"),
            mode: Mode::Dev,
            seed: "I want to fly".into(),
        };
        let session = run_session(&goal, &ctx).await.unwrap();
        assert!(matches!(session.outcome, crate::model::SessionOutcome::Success { .. }));
    }

    #[tokio::test]
    async fn empty_reply_on_first_round_is_no_initial_message() {
        let transport = ScriptedTransport { replies: vec![vec![]], call: AtomicUsize::new(0) };
        let ctx = context(transport);
        let goal = SplitGoal {
            goal: Goal::new("book_flight", "I want to fly"),
            mode: Mode::Dev,
            seed: "I want to fly".into(),
        };
        let result = run_session(&goal, &ctx).await;
        assert!(matches!(result, Err(DiscardReason::NoInitialMessage)));
    }

    #[test]
    fn persisted_session_contains_every_turn_and_the_summary_line() {
        let dir = tempdir().unwrap();
        let session = Session {
            goal: Goal::new("book_flight", "I want to fly"),
            chat_log: vec![DialogTurn {
                speaker: Speaker::User,
                round_idx: 0,
                utterance: "I want to fly".into(),
                semantic_frame: None,
            }],
            outcome: crate::model::SessionOutcome::Success { num_turns: 1 },
        };
        let path = persist_session(&session, "book_flight", "dev", 0, dir.path()).unwrap();
        let contents = std::fs::read_to_string(path).unwrap();
        assert!(contents.contains("I want to fly"));
        assert!(contents.contains("SUCCESS"));
    }

    #[test]
    fn persisted_session_json_round_trips_via_the_remediator_record() {
        let dir = tempdir().unwrap();
        let session = Session {
            goal: Goal::new("book_flight", "I want to fly"),
            chat_log: vec![DialogTurn {
                speaker: Speaker::User,
                round_idx: 0,
                utterance: "I want to fly".into(),
                semantic_frame: None,
            }],
            outcome: crate::model::SessionOutcome::Success { num_turns: 1 },
        };
        let path = persist_session_json("I want to fly", &session, "book_flight", "dev", 0, dir.path()).unwrap();
        let record = crate::remediator::load_session_or_warn(&path).unwrap();
        assert_eq!(record.seed, "I want to fly");
        assert_eq!(record.session.goal.name, "book_flight");
    }
}
