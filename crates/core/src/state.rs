//! Controller state — the tagged variant the research loop moves through.
//!
//! Terminal transitions (`Done`, `Failed`, `Cancelled`) are the only exits
//! from the loop; every other variant describes the in-flight step.

use crate::research::Reference;
use serde::{Deserialize, Serialize};

/// The research loop's current position.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum ControllerState {
    /// Session created, loop not yet entered.
    Idle,
    /// Waiting on the LLM to choose the next action.
    Deciding,
    Searching { queries: Vec<String> },
    Fetching { urls: Vec<String> },
    Reflecting { sub_questions: Vec<String> },
    Coding { program: String },
    Evaluating { answer: String },
    Replanning { analysis: String },
    /// The single forced-answer attempt after a budget/limit gate fired.
    BeastMode,
    Done { answer: String, references: Vec<Reference> },
    Failed { reason: String },
    Cancelled { reason: String },
}

impl ControllerState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ControllerState::Done { .. } | ControllerState::Failed { .. } | ControllerState::Cancelled { .. }
        )
    }

    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            ControllerState::Idle => "idle",
            ControllerState::Deciding => "deciding",
            ControllerState::Searching { .. } => "searching",
            ControllerState::Fetching { .. } => "fetching",
            ControllerState::Reflecting { .. } => "reflecting",
            ControllerState::Coding { .. } => "coding",
            ControllerState::Evaluating { .. } => "evaluating",
            ControllerState::Replanning { .. } => "replanning",
            ControllerState::BeastMode => "beast-mode",
            ControllerState::Done { .. } => "done",
            ControllerState::Failed { .. } => "failed",
            ControllerState::Cancelled { .. } => "cancelled",
        }
    }
}
