//! Answer evaluation — multi-dimensional scoring with per-dimension
//! retry accounting.
//!
//! Dimensions are processed in a fixed order and evaluation stops at the
//! first failure, so at most one requirement is decremented per step.
//! That bounds both how fast requirements exhaust and how often the
//! controller replans.

use crate::knowledge::KnowledgeStore;
use scour_core::{
    AnswerDraft, ChatMessage, EvalDimension, EvalRequirements, GenerateOptions, LlmPort, SchemaSpec,
    TokenUsage,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

/// Evaluator configuration. The order is fixed by default but exposed for
/// migration suites that depend on a different sequence.
#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    pub order: Vec<EvalDimension>,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            order: vec![
                EvalDimension::Freshness,
                EvalDimension::Plurality,
                EvalDimension::Attribution,
                EvalDimension::Completeness,
                EvalDimension::Strict,
            ],
        }
    }
}

/// Outcome of evaluating one candidate answer.
#[derive(Debug, Clone)]
pub enum EvalOutcome {
    /// Every remaining dimension passed.
    Pass,
    /// The first failing dimension, with the reviewer's reasoning.
    Fail {
        dimension: EvalDimension,
        reasoning: String,
        improvement_plan: Option<String>,
    },
    /// The evaluator itself could not produce a verdict (LLM failure).
    /// Counts as a tool failure upstream; nothing is decremented.
    Indeterminate,
}

/// Scores candidate answers through the LLM port.
pub struct Evaluator {
    llm: Arc<dyn LlmPort>,
    config: EvaluatorConfig,
}

impl Evaluator {
    pub fn new(llm: Arc<dyn LlmPort>, config: EvaluatorConfig) -> Self {
        Self { llm, config }
    }

    /// Ask which dimensions apply to a question. Called once, for the
    /// original question. Strict is always added by the caller on top of
    /// whatever this detects; detection failure therefore degrades to
    /// strict-only evaluation rather than an error.
    pub async fn detect_requirements(
        &self,
        question: &str,
        opts: &GenerateOptions,
    ) -> (Vec<EvalDimension>, TokenUsage) {
        let schema = detect_schema();
        let system = "You decide which quality criteria apply when judging an answer \
                      to a research question. Mark a criterion true only when the \
                      question genuinely demands it.";
        let messages = [ChatMessage::user(format!("Question: {question}"))];

        match self.llm.generate(&schema, system, &messages, opts).await {
            Ok(generated) => {
                let mut dims = Vec::new();
                let flag = |key: &str| generated.value.get(key).and_then(|v| v.as_bool()).unwrap_or(false);
                if flag("freshness") {
                    dims.push(EvalDimension::Freshness);
                }
                if flag("plurality") {
                    dims.push(EvalDimension::Plurality);
                }
                if flag("attribution") {
                    dims.push(EvalDimension::Attribution);
                }
                if flag("completeness") {
                    dims.push(EvalDimension::Completeness);
                }
                debug!(?dims, "detected evaluation dimensions");
                (dims, generated.usage)
            }
            Err(failure) => {
                warn!(error = %failure, "dimension detection failed, falling back to strict-only");
                (Vec::new(), failure.usage)
            }
        }
    }

    /// Evaluate a candidate against the remaining requirements. Stops at
    /// the first failing dimension.
    pub async fn evaluate(
        &self,
        question: &str,
        draft: &AnswerDraft,
        knowledge: &KnowledgeStore,
        requirements: &EvalRequirements,
        opts: &GenerateOptions,
    ) -> (EvalOutcome, TokenUsage) {
        let mut usage = TokenUsage::default();

        for dimension in requirements.ordered(&self.config.order) {
            let schema = verdict_schema(dimension);
            let (system, user) = verdict_prompt(dimension, question, draft, knowledge);
            let messages = [ChatMessage::user(user)];

            let generated = match self.llm.generate(&schema, &system, &messages, opts).await {
                Ok(g) => g,
                Err(failure) => {
                    usage.add(failure.usage);
                    warn!(%dimension, error = %failure, "evaluator call failed");
                    return (EvalOutcome::Indeterminate, usage);
                }
            };
            usage.add(generated.usage);

            let pass = generated.value.get("pass").and_then(|v| v.as_bool()).unwrap_or(false);
            let reasoning = generated
                .value
                .get("think")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            debug!(%dimension, pass, "evaluated dimension");

            if !pass {
                let improvement_plan = generated
                    .value
                    .get("improvement_plan")
                    .and_then(|v| v.as_str())
                    .filter(|s| !s.trim().is_empty())
                    .map(str::to_string);
                return (EvalOutcome::Fail { dimension, reasoning, improvement_plan }, usage);
            }
        }

        (EvalOutcome::Pass, usage)
    }
}

fn detect_schema() -> SchemaSpec {
    SchemaSpec::new(
        "evaluator:detect",
        json!({
            "type": "object",
            "properties": {
                "think": { "type": "string" },
                "freshness": { "type": "boolean", "description": "recency of information matters" },
                "plurality": { "type": "boolean", "description": "multiple items or examples are requested" },
                "attribution": { "type": "boolean", "description": "claims must cite external sources" },
                "completeness": { "type": "boolean", "description": "the question names several parts to cover" }
            },
            "required": ["think", "freshness", "plurality", "attribution", "completeness"]
        }),
    )
}

fn verdict_schema(dimension: EvalDimension) -> SchemaSpec {
    let mut properties = json!({
        "pass": { "type": "boolean" },
        "think": { "type": "string", "description": "the judgement, stated concretely" }
    });
    let mut required = vec!["pass", "think"];
    if dimension == EvalDimension::Strict {
        properties["improvement_plan"] = json!({
            "type": "string",
            "description": "what the next attempt must do differently"
        });
        required.push("improvement_plan");
    }
    SchemaSpec::new(
        format!("evaluator:{dimension}"),
        json!({
            "type": "object",
            "properties": properties,
            "required": required
        }),
    )
}

fn verdict_prompt(
    dimension: EvalDimension,
    question: &str,
    draft: &AnswerDraft,
    knowledge: &KnowledgeStore,
) -> (String, String) {
    let criterion = match dimension {
        EvalDimension::Definitive => {
            "The answer must commit to a position. Hedging, refusals, and \
             'it depends' without resolution all fail."
        }
        EvalDimension::Freshness => {
            "The answer must reflect the most current information available in \
             the evidence. Stale figures or outdated names fail."
        }
        EvalDimension::Plurality => {
            "If the question asks for several items, the answer must deliver \
             the requested count and variety."
        }
        EvalDimension::Attribution => {
            "Every substantive claim must be supported by the listed references, \
             and quotes must plausibly come from those sources."
        }
        EvalDimension::Completeness => {
            "Every explicitly named part of the question must be addressed."
        }
        EvalDimension::Strict => {
            "Judge holistically and adversarially: is this answer genuinely \
             satisfying, well-sourced, and precise? Find the weakest point. \
             If it fails, state an improvement plan."
        }
    };

    let system = format!(
        "You are a harsh reviewer judging one quality dimension of a research \
         answer.\n\nCriterion ({dimension}): {criterion}\n\nReturn pass=true \
         only if the criterion is met."
    );

    let mut user = format!("## Question\n{question}\n\n## Candidate answer\n{}\n", draft.answer);
    if !draft.references.is_empty() {
        user.push_str("\n## References\n");
        for r in &draft.references {
            user.push_str(&format!("- {} — \"{}\"\n", r.url, r.exact_quote));
        }
    }
    if dimension == EvalDimension::Attribution && !knowledge.is_empty() {
        user.push_str("\n## Evidence gathered\n");
        user.push_str(&knowledge.render());
    }
    (system, user)
}
