//! Error taxonomy for the botsim pipeline (spec §7).
//!
//! Shaped after `llm-toolkit::agent::error::AgentError`: each variant that can be retried
//! carries enough information to decide whether and how, so retry policy lives with the
//! error rather than being re-derived at every call site.

use std::time::Duration;
use thiserror::Error;

/// Malformed inputs, missing reviewed artifacts, an ambiguous dialog-act map. Fatal for the
/// current operation; propagates to the CLI (spec §7).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required artifact: {0}")]
    MissingArtifact(String),

    #[error("artifact has not been reviewed yet (found {found}, expected a `.revised.json`)")]
    UnrevisedArtifact { found: String },

    #[error("dialog-act map is ambiguous for dialog '{dialog}': bot message matched multiple request acts: {acts:?}")]
    AmbiguousActMap { dialog: String, acts: Vec<String> },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to read or parse JSON artifact at {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Bot API I/O failure (spec §7). Retried once with backoff; if that also fails the
/// session is discarded, never propagated as a hard error.
#[derive(Debug, Error, Clone)]
pub enum TransportError {
    #[error("transport request failed: {message}")]
    RequestFailed { message: String, is_retryable: bool },

    #[error("bot never emitted an initial message")]
    NoInitialMessage,

    #[error("response timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed response from bot: {0}")]
    MalformedResponse(String),
}

impl TransportError {
    /// Spec's normalized backoff policy (§9 Open Questions, resolved in DESIGN.md): at most
    /// one retry, fixed backoff, then discard.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::RequestFailed { is_retryable: true, .. } | TransportError::Timeout(_)
        )
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(200)
    }
}

/// The state machine got stuck or the round budget was exhausted (spec §7).
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("round budget of {max_round_num} exceeded with no terminal act")]
    RoundBudgetExceeded { max_round_num: usize },

    #[error("policy reached an action the goal cannot satisfy: {details}")]
    PolicyDeadEnd { details: String },
}

/// The remediator found inconsistent inputs (spec §7). Logged and the offending session is
/// skipped; never fails the overall run.
#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("could not parse summary line: {0}")]
    UnparseableSummary(String),

    #[error("missing per-session file: {0}")]
    MissingSessionFile(String),
}

/// The umbrella error type returned by orchestrator-level operations that can fail for any
/// of the above reasons (spec §6 CLI exit codes map 1:1 onto these).
#[derive(Debug, Error)]
pub enum BotsimError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Analyze(#[from] AnalyzeError),
}

impl BotsimError {
    /// Maps to the CLI exit codes of spec §6.
    pub fn exit_code(&self) -> i32 {
        match self {
            BotsimError::Config(ConfigError::UnrevisedArtifact { .. }) => 3,
            BotsimError::Config(_) => 2,
            BotsimError::Transport(_) => 4,
            BotsimError::Protocol(_) | BotsimError::Analyze(_) => 2,
        }
    }
}
