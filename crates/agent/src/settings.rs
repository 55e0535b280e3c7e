//! Controller tuning knobs, distinct from the per-request surface.

use crate::evaluator::EvaluatorConfig;
use crate::ranker::RankerWeights;
use scour_core::CodeLimits;
use std::time::Duration;

/// Session-independent tuning for the research loop.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Fraction of the token budget the regular loop may spend; the rest
    /// is reserved for the beast-mode attempt.
    pub beast_ratio: f64,
    /// Consecutive tool failures before gate #5 fires.
    pub failure_limit: u32,
    /// Knowledge items shown to the LLM.
    pub knowledge_window: usize,
    pub max_queries_per_step: usize,
    pub max_urls_per_step: usize,
    pub max_gaps_per_step: usize,
    /// `allow_reflect` is disabled while the gap queue exceeds this.
    pub gap_soft_bound: usize,
    /// Token-Jaccard threshold above which a sub-question is a duplicate.
    pub similarity_threshold: f64,
    /// Characters of page content carried into a knowledge item.
    pub knowledge_excerpt_chars: usize,
    pub llm_timeout: Duration,
    pub search_timeout: Duration,
    pub fetch_timeout: Duration,
    pub code_limits: CodeLimits,
    pub ranker_weights: RankerWeights,
    pub evaluator: EvaluatorConfig,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            beast_ratio: 0.85,
            failure_limit: 5,
            knowledge_window: 100,
            max_queries_per_step: 5,
            max_urls_per_step: 5,
            max_gaps_per_step: 4,
            gap_soft_bound: 12,
            similarity_threshold: 0.8,
            knowledge_excerpt_chars: 1500,
            llm_timeout: Duration::from_secs(30),
            search_timeout: Duration::from_secs(10),
            fetch_timeout: Duration::from_secs(30),
            code_limits: CodeLimits::default(),
            ranker_weights: RankerWeights::default(),
            evaluator: EvaluatorConfig::default(),
        }
    }
}
