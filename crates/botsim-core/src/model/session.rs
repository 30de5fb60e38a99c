//! Per-session conversation records (spec §3).

use super::goal::Goal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Speaker {
    User,
    Bot,
}

/// One turn inside a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogTurn {
    pub speaker: Speaker,
    pub round_idx: usize,
    pub utterance: String,
    /// The slot-annotated twin of `utterance` (spec §4.B), used for error backtracking.
    pub semantic_frame: Option<String>,
}

impl DialogTurn {
    /// Formats the turn as a chat-log line: `"<round> <speaker>: <utterance>"` (spec §6).
    pub fn format_log_line(&self) -> String {
        let speaker = match self.speaker {
            Speaker::User => "user",
            Speaker::Bot => "bot",
        };
        format!("{} {}: {}", self.round_idx, speaker, self.utterance)
    }
}

/// The NER error sub-kind (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NerErrorKind {
    Missed,
    Wrong,
}

/// The classification of how a session ended (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionOutcome {
    Success { num_turns: usize },
    IntentError {
        error_turn_idx: usize,
        user_utterance: String,
        predicted_intent: String,
    },
    NerError {
        error_turn_idx: usize,
        slot: String,
        error_kind: NerErrorKind,
        expected_value: String,
    },
    OtherError {
        error_turn_idx: usize,
        details: String,
    },
}

impl SessionOutcome {
    pub fn error_turn_idx(&self) -> Option<usize> {
        match self {
            SessionOutcome::Success { .. } => None,
            SessionOutcome::IntentError { error_turn_idx, .. }
            | SessionOutcome::NerError { error_turn_idx, .. }
            | SessionOutcome::OtherError { error_turn_idx, .. } => Some(*error_turn_idx),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            SessionOutcome::Success { .. } => "Success",
            SessionOutcome::IntentError { .. } => "Intent",
            SessionOutcome::NerError { .. } => "NER",
            SessionOutcome::OtherError { .. } => "Other",
        }
    }

    /// Formats the terminal chat-log summary line (spec §6):
    /// `"========== Episode <i> <STATUS> Num_of_turns: <n> =========="`.
    pub fn format_summary_line(&self, episode_index: usize) -> String {
        match self {
            SessionOutcome::Success { num_turns } => format!(
                "========== Episode {episode_index} SUCCESS Num_of_turns: {num_turns} =========="
            ),
            SessionOutcome::IntentError { error_turn_idx, .. } => format!(
                "========== Episode {episode_index} FAILURE due to IntentError>>{error_turn_idx} =========="
            ),
            SessionOutcome::NerError { error_turn_idx, .. } => format!(
                "========== Episode {episode_index} FAILURE due to NERError>>{error_turn_idx} =========="
            ),
            SessionOutcome::OtherError { error_turn_idx, .. } => format!(
                "========== Episode {episode_index} FAILURE due to OtherError>>{error_turn_idx} =========="
            ),
        }
    }
}

/// An aggregated, persisted session: the goal used, the full turn sequence, and its
/// outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub goal: Goal,
    pub chat_log: Vec<DialogTurn>,
    pub outcome: SessionOutcome,
}

impl Session {
    /// Log consistency invariant (spec §8): rounds strictly increasing, starting at the
    /// first turn's own round number (0 for bot-first platforms, 1 otherwise).
    pub fn rounds_strictly_increasing(&self) -> bool {
        self.chat_log
            .windows(2)
            .all(|w| w[1].round_idx > w[0].round_idx)
    }
}
