//! `botsim` — the CLI surface over `botsim_core` (spec §6): one subcommand per pipeline
//! stage, each reading and writing the JSON artifacts under a shared session root so a run
//! can be stopped and resumed stage by stage.
//!
//! Styled after a clap-derive CLI with a `Cli`/`Commands` split and a `match` dispatch in
//! `main`, the same shape as other workspace-adjacent binaries in this ecosystem.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use botsim_core::config::{BotCredentials, Platform, RunConfig};
use botsim_core::driver::SimulationContext;
use botsim_core::error::{BotsimError, ConfigError};
use botsim_core::goal_synth::{synthesize_goals, Mode, ParaphraseCandidate, SplitGoal};
use botsim_core::model::{AggregatedReport, DialogActMapSet, Entity, Goal, Ontology};
use botsim_core::nlg::TemplateBank;
use botsim_core::observability::{self, ObservabilityConfig};
use botsim_core::orchestrator::{self, IntentJob};
use botsim_core::paraphrase::{collect_candidates, StaticParaphraseCollaborator};
use botsim_core::parser::{self, raw::RawBundle, vendor};
use botsim_core::remediator::{self, SessionRecord, DEFAULT_OUT_OF_DOMAIN_FLOOR};
use botsim_core::simulator::SimulatorConfig;
use botsim_core::transport::{BotTransport, PlatformAClient, PlatformBClient, RetriedTransport};

#[derive(Parser)]
#[command(name = "botsim", about = "Agenda-based evaluation of task-oriented conversational bots.")]
struct Cli {
    /// Root directory every relative artifact path in the run configuration resolves against.
    #[arg(long, global = true, default_value = ".")]
    session_root: PathBuf,

    /// Path to the run configuration JSON (spec §9 ambient stack), relative to `session_root`
    /// unless absolute. Falls back to built-in defaults if it doesn't exist yet.
    #[arg(long, global = true, default_value = "run_config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Creates the session directory layout and a default run configuration.
    Prepare,
    /// Parses a raw bot bundle into a dialog-act map, an ontology, and an entity map (spec
    /// §4.C).
    Parse {
        bundle: PathBuf,
        #[arg(long, value_enum)]
        format: BundleFormat,
        #[arg(long)]
        terminal: String,
        #[arg(long)]
        confused_node: Option<String>,
    },
    /// Collects paraphrase candidates for one intent's training utterances (spec §4.D).
    Paraphrase {
        intent: String,
        #[arg(long)]
        bundle: PathBuf,
        #[arg(long, value_enum)]
        format: BundleFormat,
        /// A canned paraphrase to cycle through; repeatable. With none given, the seed itself
        /// is echoed back (spec §9 "Paraphrase collaborator interface").
        #[arg(long = "variant")]
        variants: Vec<String>,
    },
    /// Synthesizes dev/eval goals for one intent from its persisted paraphrase candidates
    /// (spec §4.D). Requires a reviewed `ontology.revised.json`.
    Goals {
        intent: String,
        #[arg(long, default_value_t = 1)]
        seed: u64,
    },
    /// Drives live sessions for the given intents against a bot endpoint (spec §4.F, §4.H).
    /// Requires a reviewed `dialog_act_map.revised.json`.
    Simulate {
        #[arg(long = "intent", required = true)]
        intents: Vec<String>,
        #[arg(long, value_enum)]
        platform: PlatformArg,
        #[arg(long)]
        endpoint: String,
        #[arg(long, env = "BOTSIM_API_KEY")]
        api_key: Option<String>,
        /// Set for bot-initiated platforms, e.g. Dialogflow-CX-style page graphs (spec §4.E
        /// "Initial-turn rule").
        #[arg(long)]
        bot_initiated: bool,
    },
    /// Analyzes every persisted session into remediation suggestions and a reordered
    /// confusion matrix (spec §4.G). Requires a reviewed `dialog_act_map.revised.json`.
    Remediate {
        #[arg(long, default_value_t = 7)]
        anneal_seed: u64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum BundleFormat {
    Xml,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum PlatformArg {
    PlatformA,
    PlatformB,
}

impl From<PlatformArg> for Platform {
    fn from(value: PlatformArg) -> Self {
        match value {
            PlatformArg::PlatformA => Platform::PlatformA,
            PlatformArg::PlatformB => Platform::PlatformB,
        }
    }
}

/// A synthesized goal plus the seed it descends from, persisted to `goals.dev.json` /
/// `goals.eval.json` (spec §6). [`SplitGoal`] itself isn't serializable since its `Mode`
/// doesn't need to be — which file a record lives in already says dev or eval.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct GoalRecord {
    seed: String,
    goal: Goal,
}

fn to_split_goal(record: GoalRecord, mode: Mode) -> SplitGoal {
    SplitGoal {
        goal: record.goal,
        mode,
        seed: record.seed,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    observability::init(ObservabilityConfig::default());

    if let Err(err) = run(cli).await {
        tracing::error!(%err, "botsim run failed");
        eprintln!("error: {err}");
        std::process::exit(err.exit_code());
    }
}

async fn run(cli: Cli) -> Result<(), BotsimError> {
    let session_root = cli.session_root;
    let config_path = resolve(&session_root, &cli.config);

    match cli.command {
        Command::Prepare => prepare(&session_root, &config_path),
        Command::Parse { bundle, format, terminal, confused_node } => {
            let config = load_or_default_config(&config_path)?;
            parse_cmd(&session_root, &config, &bundle, format, &terminal, confused_node.as_deref())
        }
        Command::Paraphrase { intent, bundle, format, variants } => {
            let config = load_or_default_config(&config_path)?;
            paraphrase_cmd(&session_root, &config, &intent, &bundle, format, variants).await
        }
        Command::Goals { intent, seed } => {
            let config = load_or_default_config(&config_path)?;
            goals_cmd(&session_root, &config, &intent, seed)
        }
        Command::Simulate { intents, platform, endpoint, api_key, bot_initiated } => {
            let config = load_or_default_config(&config_path)?;
            simulate_cmd(&session_root, &config, intents, platform.into(), endpoint, api_key, bot_initiated).await
        }
        Command::Remediate { anneal_seed } => {
            let config = load_or_default_config(&config_path)?;
            remediate_cmd(&session_root, &config, anneal_seed)
        }
    }
}

fn resolve(root: &Path, relative: &Path) -> PathBuf {
    if relative.is_absolute() {
        relative.to_path_buf()
    } else {
        root.join(relative)
    }
}

fn load_or_default_config(path: &Path) -> Result<RunConfig, BotsimError> {
    if path.exists() {
        Ok(RunConfig::from_file(path)?)
    } else {
        Ok(RunConfig::default())
    }
}

/// The artifact an operator hasn't reviewed yet is `<name>.json`; once reviewed it's copied
/// (or hand-edited) to `<name>.revised.<ext>` alongside it (spec §6 "the revised copy is the
/// signal a human has reviewed it").
fn revised_path(path: &Path) -> PathBuf {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => path.with_file_name(format!("{stem}.revised.{ext}")),
        None => path.with_file_name(format!("{stem}.revised")),
    }
}

fn require_revised(path: &Path) -> Result<PathBuf, BotsimError> {
    let revised = revised_path(path);
    if revised.exists() {
        Ok(revised)
    } else {
        Err(ConfigError::UnrevisedArtifact { found: path.display().to_string() }.into())
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, BotsimError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let value = serde_json::from_str(&contents).map_err(|source| ConfigError::Json {
        path: path.display().to_string(),
        source,
    })?;
    Ok(value)
}

fn read_json_or_default<T: serde::de::DeserializeOwned + Default>(path: &Path) -> Result<T, BotsimError> {
    if path.exists() {
        read_json(path)
    } else {
        Ok(T::default())
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), BotsimError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
            path: parent.display().to_string(),
            source,
        })?;
    }
    let body = serde_json::to_string_pretty(value).map_err(|source| ConfigError::Json {
        path: path.display().to_string(),
        source,
    })?;
    std::fs::write(path, body).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(())
}

fn load_bundle(path: &Path, format: BundleFormat) -> Result<RawBundle, BotsimError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let bundle = match format {
        BundleFormat::Xml => vendor::parse_botbuilder_bundle(&contents)?,
        BundleFormat::Json => vendor::parse_dialogflow_cx_bundle(&contents)?,
    };
    Ok(bundle)
}

fn prepare(session_root: &Path, config_path: &Path) -> Result<(), BotsimError> {
    let config = RunConfig::default();
    std::fs::create_dir_all(session_root).map_err(|source| ConfigError::Io {
        path: session_root.display().to_string(),
        source,
    })?;
    std::fs::create_dir_all(resolve(session_root, &config.file_paths.sessions_dir)).map_err(|source| ConfigError::Io {
        path: config.file_paths.sessions_dir.display().to_string(),
        source,
    })?;

    if config_path.exists() {
        println!("run configuration already present at {}", config_path.display());
    } else {
        write_json(config_path, &config)?;
        println!("wrote default run configuration to {}", config_path.display());
    }
    Ok(())
}

fn parse_cmd(
    session_root: &Path,
    config: &RunConfig,
    bundle_path: &Path,
    format: BundleFormat,
    terminal: &str,
    confused_node: Option<&str>,
) -> Result<(), BotsimError> {
    let bundle_path = resolve(session_root, bundle_path);
    let bundle = load_bundle(&bundle_path, format)?;

    let parsed = parser::parse_bundle(&bundle, terminal, confused_node, config.max_graph_paths);

    if !parsed.excluded_dialogs.is_empty() {
        eprintln!(
            "warning: excluded {} dialog(s) with unresolvable collect entities: {}",
            parsed.excluded_dialogs.len(),
            parsed.excluded_dialogs.join(", ")
        );
    }

    write_json(&resolve(session_root, &config.file_paths.dialog_act_map), &parsed.act_maps)?;
    write_json(&resolve(session_root, &config.file_paths.ontology), &parsed.ontology)?;
    write_json(&resolve(session_root, &config.file_paths.entities), &parsed.entities)?;

    println!(
        "parsed {} dialog(s), {} intent(s), {} entity definition(s) from {}",
        parsed.act_maps.len(),
        bundle.intents.len(),
        parsed.entities.len(),
        bundle_path.display()
    );
    Ok(())
}

async fn paraphrase_cmd(
    session_root: &Path,
    config: &RunConfig,
    intent: &str,
    bundle_path: &Path,
    format: BundleFormat,
    variants: Vec<String>,
) -> Result<(), BotsimError> {
    let bundle_path = resolve(session_root, bundle_path);
    let bundle = load_bundle(&bundle_path, format)?;

    let seeds = bundle
        .intents
        .iter()
        .find(|raw_intent| raw_intent.name == intent)
        .map(|raw_intent| raw_intent.training_utterances.clone())
        .ok_or_else(|| ConfigError::MissingArtifact(format!("intent '{intent}' not found in {}", bundle_path.display())))?;

    let collaborator = StaticParaphraseCollaborator::new(variants);
    let candidates = collect_candidates(&collaborator, &seeds, config.paraphraser.candidates_per_seed).await;

    let paraphrases_path = resolve(session_root, &config.file_paths.paraphrases);
    let mut by_intent: HashMap<String, Vec<ParaphraseCandidate>> = read_json_or_default(&paraphrases_path)?;
    let count = candidates.len();
    by_intent.insert(intent.to_string(), candidates);
    write_json(&paraphrases_path, &by_intent)?;

    println!("collected {count} paraphrase candidate(s) for '{intent}' across {} seed(s)", seeds.len());
    Ok(())
}

fn goals_cmd(session_root: &Path, config: &RunConfig, intent: &str, seed: u64) -> Result<(), BotsimError> {
    let ontology_path = resolve(session_root, &config.file_paths.ontology);
    let ontology: Ontology = read_json(&require_revised(&ontology_path)?)?;

    let paraphrases_path = resolve(session_root, &config.file_paths.paraphrases);
    let by_intent: HashMap<String, Vec<ParaphraseCandidate>> = read_json(&paraphrases_path)?;
    let candidates = by_intent
        .get(intent)
        .ok_or_else(|| ConfigError::MissingArtifact(format!("no paraphrase candidates persisted for intent '{intent}'")))?;

    let mut rng = StdRng::seed_from_u64(seed);
    let split = synthesize_goals(intent, candidates, &ontology, config.eval_split_probability, &mut rng);

    let mut dev_records = Vec::new();
    let mut eval_records = Vec::new();
    for split_goal in split {
        let record = GoalRecord { seed: split_goal.seed, goal: split_goal.goal };
        match split_goal.mode {
            Mode::Dev => dev_records.push(record),
            Mode::Eval => eval_records.push(record),
        }
    }

    let goals_dev_path = resolve(session_root, &config.file_paths.goals_dev);
    let goals_eval_path = resolve(session_root, &config.file_paths.goals_eval);
    let mut dev: HashMap<String, Vec<GoalRecord>> = read_json_or_default(&goals_dev_path)?;
    let mut eval: HashMap<String, Vec<GoalRecord>> = read_json_or_default(&goals_eval_path)?;

    println!("synthesized {} dev goal(s) and {} eval goal(s) for '{intent}'", dev_records.len(), eval_records.len());

    dev.insert(intent.to_string(), dev_records);
    eval.insert(intent.to_string(), eval_records);
    write_json(&goals_dev_path, &dev)?;
    write_json(&goals_eval_path, &eval)?;
    Ok(())
}

async fn simulate_cmd(
    session_root: &Path,
    config: &RunConfig,
    intents: Vec<String>,
    platform: Platform,
    endpoint: String,
    api_key: Option<String>,
    bot_initiated: bool,
) -> Result<(), BotsimError> {
    let act_map_path = resolve(session_root, &config.file_paths.dialog_act_map);
    let act_maps: DialogActMapSet = read_json(&require_revised(&act_map_path)?)?;

    let templates_path = resolve(session_root, &config.file_paths.templates);
    let templates = Arc::new(TemplateBank::from_file(&templates_path)?);

    let goals_dev_path = resolve(session_root, &config.file_paths.goals_dev);
    let goals_eval_path = resolve(session_root, &config.file_paths.goals_eval);
    let dev: HashMap<String, Vec<GoalRecord>> = read_json_or_default(&goals_dev_path)?;
    let eval: HashMap<String, Vec<GoalRecord>> = read_json_or_default(&goals_eval_path)?;

    let credentials = BotCredentials { platform, endpoint, api_key };
    let transport: Arc<dyn BotTransport> = match credentials.platform {
        Platform::PlatformA => Arc::new(RetriedTransport::new(PlatformAClient::new(&credentials))),
        Platform::PlatformB => Arc::new(RetriedTransport::new(PlatformBClient::new(&credentials))),
    };

    let all_act_maps = Arc::new(act_maps.clone());
    let mut jobs = Vec::with_capacity(intents.len());
    for intent in &intents {
        let act_map = act_maps
            .get(intent)
            .ok_or_else(|| ConfigError::MissingArtifact(format!("no dialog-act map for intent '{intent}'")))?
            .clone();

        let context = Arc::new(SimulationContext {
            transport: Arc::clone(&transport),
            intent: intent.clone(),
            act_map,
            all_act_maps: Arc::clone(&all_act_maps),
            templates: Arc::clone(&templates),
            simulator_config: SimulatorConfig {
                max_round_num: config.max_round_num,
                intent_check_turn_index: config.intent_check_turn_index,
            },
            bot_initiated,
        });

        let dev_goals = dev
            .get(intent)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|record| to_split_goal(record, Mode::Dev))
            .collect();
        let eval_goals = eval
            .get(intent)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|record| to_split_goal(record, Mode::Eval))
            .collect();

        jobs.push(IntentJob { intent: intent.clone(), context, dev_goals, eval_goals });
    }

    let run_config = Arc::new(config.clone());
    let results = orchestrator::run_all_jobs(jobs, run_config).await;

    for result in &results {
        println!(
            "{} [{}]: {} session(s) recorded, {} discarded",
            result.intent,
            result.mode.as_str(),
            result.sessions.len(),
            result.discarded
        );
    }
    Ok(())
}

fn remediate_cmd(session_root: &Path, config: &RunConfig, anneal_seed: u64) -> Result<(), BotsimError> {
    let act_map_path = resolve(session_root, &config.file_paths.dialog_act_map);
    let act_maps: DialogActMapSet = read_json(&require_revised(&act_map_path)?)?;

    let entities_path = resolve(session_root, &config.file_paths.entities);
    let entities: HashMap<String, Entity> = read_json_or_default(&entities_path)?;

    let sessions_dir = resolve(session_root, &config.file_paths.sessions_dir);
    let mut per_intent_records: HashMap<String, Vec<SessionRecord>> = HashMap::new();
    let mut per_intent_mode_records: HashMap<(String, String), Vec<SessionRecord>> = HashMap::new();

    let entries = std::fs::read_dir(&sessions_dir).map_err(|source| ConfigError::Io {
        path: sessions_dir.display().to_string(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| ConfigError::Io {
            path: sessions_dir.display().to_string(),
            source,
        })?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some((intent, mode)) = parse_session_filename(&path) else { continue };
        let Ok(record) = remediator::load_session_or_warn(&path) else { continue };
        per_intent_records.entry(intent.clone()).or_default().push(record.clone());
        per_intent_mode_records.entry((intent, mode)).or_default().push(record);
    }

    let mut analyses = HashMap::new();
    for ((intent, mode), records) in &per_intent_mode_records {
        let analysis = remediator::analyze_intent(records, &act_maps, &entities, config.intent_check_turn_index, DEFAULT_OUT_OF_DOMAIN_FLOOR);
        analyses.insert((intent.clone(), mode.clone()), analysis);
    }

    let mut labels: Vec<String> = act_maps.keys().cloned().collect();
    labels.sort();
    let confusion_matrix = if labels.len() >= 2 {
        Some(remediator::build_confusion_matrix(
            labels,
            &per_intent_records,
            &act_maps,
            config.intent_check_turn_index,
            DEFAULT_OUT_OF_DOMAIN_FLOOR,
        ))
    } else {
        None
    };

    let mut rng = StdRng::seed_from_u64(anneal_seed);
    let report = remediator::build_aggregated_report(analyses, confusion_matrix, &mut rng);

    write_json(&resolve(session_root, &config.file_paths.aggregated_report), &report)?;
    print_report_summary(&report);
    Ok(())
}

/// Recovers `(intent, mode)` from a persisted session filename,
/// `<intent>_<dev|eval>_<index>.json` (spec §6), by locating the rightmost `_dev_`/`_eval_`
/// marker rather than splitting on every underscore, since intent names may contain them too.
fn parse_session_filename(path: &Path) -> Option<(String, String)> {
    let stem = path.file_stem()?.to_str()?;
    for mode in ["dev", "eval"] {
        let marker = format!("_{mode}_");
        if let Some(pos) = stem.rfind(&marker) {
            let remainder = &stem[pos + marker.len()..];
            if !remainder.is_empty() && remainder.chars().all(|c| c.is_ascii_digit()) {
                return Some((stem[..pos].to_string(), mode.to_string()));
            }
        }
    }
    None
}

/// Spec §7: "the CLI prints a summary header and a per-intent table at exit."
fn print_report_summary(report: &AggregatedReport) {
    println!("=== aggregated report ===");
    let mut keys: Vec<&String> = report.per_intent_mode.keys().collect();
    keys.sort();
    for key in keys {
        let entry = &report.per_intent_mode[key];
        println!(
            "{key}: success={} intent_error={} ner_error={} other_error={} (total={})",
            entry.counts.success,
            entry.counts.intent_error,
            entry.counts.ner_error,
            entry.counts.other_error,
            entry.counts.total(),
        );
    }
    if let Some(cm) = &report.confusion_matrix {
        println!("confusion matrix ({} label(s)): trace {} / mass {}", cm.n(), cm.trace(), cm.total_mass());
    }
}
