//! The invocation contract: `research(request) -> result`.

use crate::action::ActionKind;
use crate::knowledge::KnowledgeItem;
use serde::{Deserialize, Serialize};

/// Everything a caller can say about one research session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchRequest {
    /// The question to research.
    pub question: String,

    /// Total token budget for the session. The regular loop uses
    /// `beast_ratio` of this; the remainder is reserved for beast mode.
    pub token_budget: u64,

    /// Attempts per evaluation dimension before it is exhausted.
    pub max_bad_attempts: u32,

    /// Hard cap on total steps across replans.
    pub max_steps: u32,

    /// Session deadline, from session start.
    pub max_duration_ms: u64,

    /// Per-step timeout applied to each outbound tool call.
    pub step_timeout_ms: u64,

    /// Forbid answering at step 1 without any research.
    pub no_direct_answer: bool,

    /// Hostnames to boost in URL ranking.
    pub boost_hostnames: Vec<String>,

    /// Hostnames to penalize in URL ranking.
    pub bad_hostnames: Vec<String>,

    /// If non-empty, only these hostnames are eligible at all.
    pub only_hostnames: Vec<String>,

    /// How many ranked candidate URLs to show the LLM per step.
    pub max_returned_urls: usize,

    /// Cap on references in the final result.
    pub max_references: usize,

    /// References scoring below this are dropped from the final result.
    pub min_relevance_score: f64,

    /// Answer language hint.
    pub language_code: Option<String>,

    /// Search vendor language hint.
    pub search_language_code: Option<String>,

    /// Search vendor override ("serper", "brave").
    pub search_provider: Option<String>,

    /// Whether fetched pages should keep image alt text.
    pub with_images: bool,
}

impl ResearchRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self { question: question.into(), ..Default::default() }
    }
}

impl Default for ResearchRequest {
    fn default() -> Self {
        Self {
            question: String::new(),
            token_budget: 1_000_000,
            max_bad_attempts: 2,
            max_steps: 40,
            max_duration_ms: 300_000,
            step_timeout_ms: 30_000,
            no_direct_answer: false,
            boost_hostnames: Vec::new(),
            bad_hostnames: Vec::new(),
            only_hostnames: Vec::new(),
            max_returned_urls: 20,
            max_references: 8,
            min_relevance_score: 0.0,
            language_code: None,
            search_language_code: None,
            search_provider: None,
            with_images: false,
        }
    }
}

/// A citation in the final answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reference {
    pub url: String,
    pub exact_quote: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
    pub relevance_score: f64,
}

/// Per-action dispatch counts for the metrics block.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ActionCounts {
    pub search: u32,
    pub visit: u32,
    pub reflect: u32,
    pub code: u32,
    pub answer: u32,
}

impl ActionCounts {
    pub fn record(&mut self, kind: ActionKind) {
        match kind {
            ActionKind::Search => self.search += 1,
            ActionKind::Visit => self.visit += 1,
            ActionKind::Reflect => self.reflect += 1,
            ActionKind::Code => self.code += 1,
            ActionKind::Answer => self.answer += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.search + self.visit + self.reflect + self.code + self.answer
    }
}

/// Session metrics reported with every result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metrics {
    pub total_steps: u32,
    pub tokens_used: u64,
    pub duration_ms: u64,
    pub action_counts: ActionCounts,
    pub tool_failure_count: u32,
}

/// The outcome of one research session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchResult {
    pub answer: String,

    /// False only when the session failed to synthesize anything.
    pub is_final: bool,

    /// True when evaluation requirements were exhausted and the best
    /// candidate so far was returned instead of a passing answer.
    pub is_best: bool,

    pub references: Vec<Reference>,

    /// URLs the agent attempted to visit.
    pub visited_urls: Vec<String>,

    /// URLs whose content was successfully read.
    pub read_urls: Vec<String>,

    /// Every URL the session learned about.
    pub all_urls: Vec<String>,

    pub knowledge: Vec<KnowledgeItem>,

    pub metrics: Metrics,
}
