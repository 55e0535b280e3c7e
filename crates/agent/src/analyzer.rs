//! Error analyzer — turns a failed answer attempt into a knowledge item.
//!
//! The diary is cleared on replanning; the analysis survives as an
//! `ErrorAnalysis` knowledge item so later iterations still see why
//! earlier answers were rejected.

use scour_core::{ChatMessage, GenerateOptions, KnowledgeItem, LlmPort, SchemaSpec, TokenUsage};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

/// The structured post-mortem of one failed attempt.
#[derive(Debug, Clone)]
pub struct ErrorAnalysis {
    pub recap: String,
    pub blame: String,
    pub improvement: String,
}

impl ErrorAnalysis {
    /// Render as a knowledge item for the store.
    pub fn into_knowledge(self, question: &str) -> KnowledgeItem {
        KnowledgeItem::error_analysis(
            format!("Why did the answer to \"{question}\" get rejected?"),
            format!(
                "Recap: {}\nBlame: {}\nImprovement: {}",
                self.recap, self.blame, self.improvement
            ),
        )
    }
}

/// Produces post-mortems through the LLM port.
pub struct ErrorAnalyzer {
    llm: Arc<dyn LlmPort>,
}

impl ErrorAnalyzer {
    pub fn new(llm: Arc<dyn LlmPort>) -> Self {
        Self { llm }
    }

    /// Analyze a failed attempt. Never fails: if the LLM call itself
    /// fails, a fallback analysis is synthesized from the evaluator's
    /// reasoning so the knowledge item always exists.
    pub async fn analyze(
        &self,
        question: &str,
        diary_text: &str,
        eval_reasoning: &str,
        opts: &GenerateOptions,
    ) -> (ErrorAnalysis, TokenUsage) {
        let schema = analysis_schema();
        let system = "You review a failed research attempt. From the step narrative and \
                      the reviewer's rejection, produce: a recap of what was done, where \
                      the blame lies, and what the next attempt should change.";
        let user = format!(
            "## Question\n{question}\n\n## Steps taken\n{diary_text}\n\n\
             ## Reviewer's rejection\n{eval_reasoning}",
        );
        let messages = [ChatMessage::user(user)];

        match self.llm.generate(&schema, system, &messages, opts).await {
            Ok(generated) => {
                let field = |key: &str| {
                    generated
                        .value
                        .get(key)
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string()
                };
                (
                    ErrorAnalysis {
                        recap: field("recap"),
                        blame: field("blame"),
                        improvement: field("improvement"),
                    },
                    generated.usage,
                )
            }
            Err(failure) => {
                warn!(error = %failure, "error analysis call failed, using fallback");
                (
                    ErrorAnalysis {
                        recap: truncate(diary_text, 400),
                        blame: "The evaluator rejected the answer.".into(),
                        improvement: eval_reasoning.to_string(),
                    },
                    failure.usage,
                )
            }
        }
    }
}

fn analysis_schema() -> SchemaSpec {
    SchemaSpec::new(
        "error-analysis",
        json!({
            "type": "object",
            "properties": {
                "recap": { "type": "string", "description": "what the agent did, briefly" },
                "blame": { "type": "string", "description": "the root cause of the rejection" },
                "improvement": { "type": "string", "description": "what to change next time" }
            },
            "required": ["recap", "blame", "improvement"]
        }),
    )
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &s[..end])
    }
}
