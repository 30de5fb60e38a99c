//! Platform-neutral raw extraction types (spec §4.C step 1): what a vendor bundle yields
//! before any semantic interpretation.

use serde::{Deserialize, Serialize};

/// One unit of dialog flow, in the order the original bot definition declared it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawStep {
    /// A plain bot message (possibly with `{slot}` placeholders, stripped in step 2).
    Message { text: String },
    /// Asks the user for `slot`, extracted as `entity`. `prompt` is the initial ask;
    /// `retries` are the clarification messages shown on extraction failure.
    Collect {
        slot: String,
        entity: String,
        prompt: String,
        retries: Vec<String>,
    },
    /// A branching condition; does not itself register an act, only an edge.
    Condition { expression: String, target: String },
    /// An unconditional jump to another dialog/page.
    Navigate { target: String },
    /// Invokes another dialog as a sub-dialog, returning control afterward.
    SubDialogInvoke { target: String },
}

/// All raw steps for one dialog, in declaration order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawDialog {
    pub name: String,
    pub steps: Vec<RawStep>,
}

/// One intent's training phrases, as declared by the bot builder.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawIntent {
    pub name: String,
    pub training_utterances: Vec<String>,
}

/// A custom entity definition (spec §3 `Entity`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RawEntityDef {
    ValueList { name: String, values: Vec<String> },
    Regex { name: String, pattern: String },
}

impl RawEntityDef {
    pub fn name(&self) -> &str {
        match self {
            RawEntityDef::ValueList { name, .. } | RawEntityDef::Regex { name, .. } => name,
        }
    }
}

/// The platform-neutral output of step 1: every dialog's raw steps, every intent's
/// training utterances, and every custom entity definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawBundle {
    pub dialogs: Vec<RawDialog>,
    pub intents: Vec<RawIntent>,
    pub entities: Vec<RawEntityDef>,
}

impl RawBundle {
    pub fn dialog(&self, name: &str) -> Option<&RawDialog> {
        self.dialogs.iter().find(|d| d.name == name)
    }
}
