//! Run configuration (spec §6, §9 ambient stack): paths to artifacts, bot credentials, and
//! the knobs that govern simulation and remediation. Loaded from JSON, same pattern as the
//! teacher's `OrchestratorConfig`: a `Default` impl with sane values plus a `from_file`
//! loader for overrides.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Which of the two bot platforms a run talks to (spec §4.F).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// Turn-based REST API, stateless per call.
    PlatformA,
    /// Session-based REST API, carries a session id across a conversation.
    PlatformB,
}

/// Bot API credentials and endpoint, kept out of the rest of `RunConfig` so it can be
/// supplied from the environment (spec §9: "credentials never land in persisted
/// artifacts").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotCredentials {
    pub platform: Platform,
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

/// File layout for one pipeline run (spec §6's artifact paths).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilePaths {
    pub raw_bundle: PathBuf,
    pub dialog_act_map: PathBuf,
    pub ontology: PathBuf,
    /// Entity definitions extracted from the raw bundle, keyed by name (spec §6
    /// `goals_dir/entities.json`).
    pub entities: PathBuf,
    /// Paraphrase candidates collected per seed, keyed by intent (spec §6
    /// `goals_dir/<intent>_<para_setting>.paraphrases.json`).
    pub paraphrases: PathBuf,
    /// The NLG template bank (spec §6 `conf/template.json`).
    pub templates: PathBuf,
    pub goals_dev: PathBuf,
    pub goals_eval: PathBuf,
    pub sessions_dir: PathBuf,
    pub aggregated_report: PathBuf,
}

impl Default for FilePaths {
    fn default() -> Self {
        Self {
            raw_bundle: PathBuf::from("bundle.xml"),
            dialog_act_map: PathBuf::from("dialog_act_map.json"),
            ontology: PathBuf::from("ontology.json"),
            entities: PathBuf::from("entities.json"),
            paraphrases: PathBuf::from("paraphrases.json"),
            templates: PathBuf::from("template.json"),
            goals_dev: PathBuf::from("goals.dev.json"),
            goals_eval: PathBuf::from("goals.eval.json"),
            sessions_dir: PathBuf::from("sessions"),
            aggregated_report: PathBuf::from("aggregated_report.json"),
        }
    }
}

/// Knobs for the paraphrase collaborator (spec §4.D, §9 "Paraphrase collaborator
/// interface").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParaphraserConfig {
    pub candidates_per_seed: usize,
    pub timeout_ms: u64,
}

impl Default for ParaphraserConfig {
    fn default() -> Self {
        Self {
            candidates_per_seed: 5,
            timeout_ms: 30_000,
        }
    }
}

/// Top-level knobs shared across the whole run (spec §4.D dev/eval split, §4.E round
/// budget, §4.F batching, §4.H parallelism).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub paraphraser: ParaphraserConfig,
    pub file_paths: FilePaths,
    /// Probability a goal is assigned to the eval split rather than dev (spec §4.D).
    pub eval_split_probability: f64,
    /// Hard cap on rounds per session before it's recorded as `OtherError` (spec §4.E).
    pub max_round_num: usize,
    /// The round at which the bot's intent-classification outcome is expected to be
    /// observable; per-platform knob, `{2, 3}` in practice (spec §4.E).
    pub intent_check_turn_index: usize,
    /// Sessions per batch when driving a bot (spec §4.F).
    pub batch_size: usize,
    /// Max concurrent (intent, mode) jobs (spec §4.H).
    pub max_parallelism: usize,
    /// Max simple paths explored per dialog when building the ontology's reachability set
    /// (spec §9 "Cyclic graphs").
    pub max_graph_paths: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            paraphraser: ParaphraserConfig::default(),
            file_paths: FilePaths::default(),
            eval_split_probability: 0.2,
            max_round_num: 20,
            intent_check_turn_index: 3,
            batch_size: 25,
            max_parallelism: 4,
            max_graph_paths: 1000,
        }
    }
}

impl RunConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Json {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|source| ConfigError::Json {
            path: "<in-memory>".to_string(),
            source,
        })
    }
}
