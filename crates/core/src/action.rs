//! Actions — the vocabulary the LLM chooses from at each step.
//!
//! The controller never asks the LLM a free-form question about what to do;
//! it presents a discriminated-union schema of the currently permitted
//! actions and decodes the reply into an [`Action`].

use serde::{Deserialize, Serialize};

/// A validated action decoded from LLM output.
///
/// Every variant carries `think` — the model's free-form reasoning for
/// choosing this action. It is recorded in the diary, never executed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Action {
    /// Issue one or more web search queries.
    Search { think: String, queries: Vec<String> },

    /// Visit and read a list of URLs.
    Visit { think: String, urls: Vec<String> },

    /// Add sub-questions (gaps) to the research queue.
    Reflect { think: String, questions: Vec<String> },

    /// Run a small program against the current knowledge snapshot.
    Code { think: String, program: String },

    /// Propose a final answer with supporting references.
    Answer {
        think: String,
        answer: String,
        #[serde(default)]
        references: Vec<AnswerReference>,
    },
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Search { .. } => ActionKind::Search,
            Action::Visit { .. } => ActionKind::Visit,
            Action::Reflect { .. } => ActionKind::Reflect,
            Action::Code { .. } => ActionKind::Code,
            Action::Answer { .. } => ActionKind::Answer,
        }
    }

    pub fn think(&self) -> &str {
        match self {
            Action::Search { think, .. }
            | Action::Visit { think, .. }
            | Action::Reflect { think, .. }
            | Action::Code { think, .. }
            | Action::Answer { think, .. } => think,
        }
    }
}

/// The discriminant of an [`Action`], used for permissions and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Search,
    Visit,
    Reflect,
    Code,
    Answer,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ActionKind::Search => "search",
            ActionKind::Visit => "visit",
            ActionKind::Reflect => "reflect",
            ActionKind::Code => "code",
            ActionKind::Answer => "answer",
        };
        write!(f, "{s}")
    }
}

/// A reference attached to an answer by the LLM.
///
/// Enriched into a full [`crate::research::Reference`] by the controller
/// using the URL ranker's records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnswerReference {
    pub url: String,
    #[serde(default, alias = "exactQuote")]
    pub exact_quote: String,
}

/// A candidate answer en route to the evaluator.
#[derive(Debug, Clone)]
pub struct AnswerDraft {
    pub answer: String,
    pub references: Vec<AnswerReference>,
}

/// The five permission bits the controller modulates between steps.
///
/// Forbidding an action removes its variant from the next step's schema,
/// so a failing move cannot be repeated immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    pub answer: bool,
    pub search: bool,
    pub read: bool,
    pub reflect: bool,
    pub code: bool,
}

impl Permissions {
    pub fn all() -> Self {
        Self { answer: true, search: true, read: true, reflect: true, code: true }
    }

    pub fn none() -> Self {
        Self { answer: false, search: false, read: false, reflect: false, code: false }
    }

    /// Whether any action at all is permitted. All-false is a termination gate.
    pub fn any(&self) -> bool {
        self.answer || self.search || self.read || self.reflect || self.code
    }

    pub fn allows(&self, kind: ActionKind) -> bool {
        match kind {
            ActionKind::Search => self.search,
            ActionKind::Visit => self.read,
            ActionKind::Reflect => self.reflect,
            ActionKind::Code => self.code,
            ActionKind::Answer => self.answer,
        }
    }
}

impl Default for Permissions {
    fn default() -> Self {
        Self::all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_tagged_serialization() {
        let action = Action::Search {
            think: "need sources".into(),
            queries: vec!["rust book author".into()],
        };
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["action"], "search");
        assert_eq!(json["queries"][0], "rust book author");
    }

    #[test]
    fn answer_deserializes_without_references() {
        let action: Action = serde_json::from_value(serde_json::json!({
            "action": "answer",
            "think": "simple arithmetic",
            "answer": "4"
        }))
        .unwrap();
        match action {
            Action::Answer { answer, references, .. } => {
                assert_eq!(answer, "4");
                assert!(references.is_empty());
            }
            other => panic!("Expected answer, got {:?}", other.kind()),
        }
    }

    #[test]
    fn reference_accepts_camel_case_quote() {
        let r: AnswerReference = serde_json::from_value(serde_json::json!({
            "url": "https://example.com",
            "exactQuote": "a quote"
        }))
        .unwrap();
        assert_eq!(r.exact_quote, "a quote");
    }

    #[test]
    fn permissions_gating() {
        let mut p = Permissions::all();
        assert!(p.any());
        p.answer = false;
        assert!(!p.allows(ActionKind::Answer));
        assert!(p.allows(ActionKind::Search));
        assert!(Permissions::none().any() == false);
    }
}
