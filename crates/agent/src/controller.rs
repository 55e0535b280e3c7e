//! The research loop controller.
//!
//! A bounded, cancellable state machine: every iteration re-checks the
//! termination gates, asks the LLM for one action through the schema
//! contract, dispatches it to the step executor, and applies the returned
//! delta. Terminal transitions are the only exits; when any budget or
//! limit gate fires the loop ends through a single beast-mode attempt.

use crate::analyzer::ErrorAnalyzer;
use crate::budget::BudgetClock;
use crate::diary::Diary;
use crate::evaluator::{EvalOutcome, Evaluator};
use crate::executor::{StepDelta, StepExecutor};
use crate::gaps::GapQueue;
use crate::knowledge::KnowledgeStore;
use crate::prompt::{self, PromptInputs};
use crate::ranker::{HostRules, UrlRanker};
use crate::schema::{decode_action, ActionSchemaBuilder};
use crate::settings::ControllerSettings;
use scour_core::{
    Action, ActionCounts, AnswerDraft, CancelToken, ChatMessage, CodeRunner, ConfigError,
    ControllerState, Error, EvalDimension, EvalRequirements, FetchPort, GenerateOptions,
    KnowledgeItem, LlmPort, Metrics, Permissions, Reference, ResearchRequest, ResearchResult,
    Result, SearchPort,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Which gate ended the regular loop.
#[derive(Debug, Clone, PartialEq, Eq)]
enum GateFired {
    Cancelled(String),
    TokenBudget,
    StepLimit,
    Deadline,
    ToolFailures,
    NoPermittedAction,
}

impl GateFired {
    fn reason(&self) -> &str {
        match self {
            GateFired::Cancelled(r) => r,
            GateFired::TokenBudget => "token budget threshold reached",
            GateFired::StepLimit => "step limit reached",
            GateFired::Deadline => "deadline reached",
            GateFired::ToolFailures => "too many consecutive tool failures",
            GateFired::NoPermittedAction => "no action is permitted",
        }
    }
}

/// Drives one research session per [`research`](Self::research) call.
/// The controller itself is stateless between calls; all session state
/// lives in the per-call [`Session`].
pub struct ResearchController {
    llm: Arc<dyn LlmPort>,
    search: Arc<dyn SearchPort>,
    fetch: Arc<dyn FetchPort>,
    code: Arc<dyn CodeRunner>,
    settings: ControllerSettings,
}

/// All state owned by one research session. Single writer: the controller.
struct Session {
    request: ResearchRequest,
    gaps: GapQueue,
    knowledge: KnowledgeStore,
    diary: Diary,
    ranker: UrlRanker,
    budget: BudgetClock,
    permissions: Permissions,
    requirements: EvalRequirements,
    requirements_seeded: bool,
    improvement_plans: Vec<String>,
    best_answer: Option<AnswerDraft>,
    consecutive_tool_failures: u32,
    /// Lifetime failure count for metrics; never reset.
    total_tool_failures: u32,
    action_counts: ActionCounts,
    /// Total step at which `allow_answer` was turned off by replanning.
    answer_suppressed_at: Option<u32>,
    /// Set when the loop gave up gracefully on requirement exhaustion.
    gave_up: bool,
    state: ControllerState,
}

impl Session {
    fn record_tool_failure(&mut self) {
        self.consecutive_tool_failures += 1;
        self.total_tool_failures += 1;
    }

    fn new(request: ResearchRequest, settings: &ControllerSettings) -> Self {
        let budget = BudgetClock::new(
            request.token_budget,
            request.max_steps,
            Duration::from_millis(request.max_duration_ms),
            settings.beast_ratio,
        );
        let rules = HostRules {
            boost: request.boost_hostnames.clone(),
            bad: request.bad_hostnames.clone(),
            only: request.only_hostnames.clone(),
        };
        Self {
            gaps: GapQueue::new(request.question.clone()),
            knowledge: KnowledgeStore::new(settings.knowledge_window),
            diary: Diary::new(),
            ranker: UrlRanker::new(settings.ranker_weights.clone(), rules),
            budget,
            permissions: Permissions::all(),
            requirements: EvalRequirements::new(),
            requirements_seeded: false,
            improvement_plans: Vec::new(),
            best_answer: None,
            consecutive_tool_failures: 0,
            total_tool_failures: 0,
            action_counts: ActionCounts::default(),
            answer_suppressed_at: None,
            gave_up: false,
            state: ControllerState::Idle,
            request,
        }
    }
}

impl ResearchController {
    pub fn new(
        llm: Arc<dyn LlmPort>,
        search: Arc<dyn SearchPort>,
        fetch: Arc<dyn FetchPort>,
        code: Arc<dyn CodeRunner>,
    ) -> Self {
        Self { llm, search, fetch, code, settings: ControllerSettings::default() }
    }

    pub fn with_settings(mut self, settings: ControllerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Run one research session to a terminal state.
    ///
    /// Only configuration errors and cancellation surface as `Err`; every
    /// other failure mode ends in an `Ok` result carrying `is_final` /
    /// `is_best` flags.
    pub async fn research(
        &self,
        request: ResearchRequest,
        cancel: CancelToken,
    ) -> Result<ResearchResult> {
        validate(&request)?;
        let settings = self.session_settings(&request);
        let executor = StepExecutor::new(
            self.llm.clone(),
            self.search.clone(),
            self.fetch.clone(),
            self.code.clone(),
            settings.clone(),
        );
        let evaluator = Evaluator::new(self.llm.clone(), settings.evaluator.clone());
        let analyzer = ErrorAnalyzer::new(self.llm.clone());

        let mut s = Session::new(request, &settings);
        info!(question = %s.request.question, budget = s.request.token_budget, "research session starting");

        let fired: Option<GateFired> = loop {
            // Permission recovery: an answer suppression lasts exactly one
            // subsequent step.
            if let Some(at) = s.answer_suppressed_at {
                if s.budget.total_steps() > at {
                    s.permissions.answer = true;
                    s.answer_suppressed_at = None;
                }
            }

            if let Some(gate) = self.check_gates(&s, &cancel, &settings) {
                break Some(gate);
            }

            self.step(&mut s, &executor, &evaluator, &analyzer, &settings, &cancel).await;

            if s.state.is_terminal() {
                // Natural terminal transition (answer accepted or
                // requirements exhausted) — no beast mode needed.
                break None;
            }
        };

        let Some(fired) = fired else {
            return Ok(build_result(s));
        };

        match fired {
            GateFired::Cancelled(reason) => {
                info!(%reason, "session cancelled");
                s.state = ControllerState::Cancelled { reason: reason.clone() };
                Err(Error::Cancelled(reason))
            }
            gate => {
                info!(reason = gate.reason(), "termination gate fired, entering beast mode");
                self.beast_mode(&mut s, &settings, &cancel).await;
                match &s.state {
                    ControllerState::Cancelled { reason } => Err(Error::Cancelled(reason.clone())),
                    _ => Ok(build_result(s)),
                }
            }
        }
    }

    /// Per-request settings: `step_timeout_ms` caps every outbound call.
    fn session_settings(&self, request: &ResearchRequest) -> ControllerSettings {
        let mut settings = self.settings.clone();
        if request.step_timeout_ms > 0 {
            let cap = Duration::from_millis(request.step_timeout_ms);
            settings.llm_timeout = settings.llm_timeout.min(cap);
            settings.search_timeout = settings.search_timeout.min(cap);
            settings.fetch_timeout = settings.fetch_timeout.min(cap);
        }
        settings
    }

    /// The six gates, evaluated in order before every iteration.
    fn check_gates(
        &self,
        s: &Session,
        cancel: &CancelToken,
        settings: &ControllerSettings,
    ) -> Option<GateFired> {
        if cancel.is_cancelled() {
            return Some(GateFired::Cancelled(
                cancel.reason().unwrap_or_else(|| "cancelled".into()),
            ));
        }
        if s.budget.over_beast_threshold() {
            return Some(GateFired::TokenBudget);
        }
        if s.budget.step_limit_exceeded() {
            return Some(GateFired::StepLimit);
        }
        if s.budget.deadline_exceeded() {
            return Some(GateFired::Deadline);
        }
        if s.consecutive_tool_failures >= settings.failure_limit {
            return Some(GateFired::ToolFailures);
        }
        if !s.permissions.any() {
            return Some(GateFired::NoPermittedAction);
        }
        None
    }

    /// One iteration: select the question, obtain a validated action,
    /// dispatch it, apply the delta.
    async fn step(
        &self,
        s: &mut Session,
        executor: &StepExecutor,
        evaluator: &Evaluator,
        analyzer: &ErrorAnalyzer,
        settings: &ControllerSettings,
        cancel: &CancelToken,
    ) {
        let total = s.budget.tick_step();
        let current = s.gaps.select(total - 1).to_string();
        debug!(step = total, question = %current, "step starting");

        let schema = ActionSchemaBuilder::new(s.permissions)
            .with_limits(
                settings.max_queries_per_step,
                settings.max_urls_per_step,
                settings.max_gaps_per_step,
            )
            .build();

        let (system, user) = {
            let selected = s.ranker.sort_select(s.request.max_returned_urls);
            let inputs = PromptInputs {
                original: s.gaps.original(),
                current: &current,
                knowledge: &s.knowledge,
                diary: &s.diary,
                urls: &selected,
                improvement_plans: &s.improvement_plans,
                permissions: s.permissions,
                language: s.request.language_code.as_deref(),
            };
            prompt::decide(&inputs)
        };

        s.state = ControllerState::Deciding;
        let opts = GenerateOptions { timeout: settings.llm_timeout, ..Default::default() };
        let generated = match with_cancel(
            cancel,
            self.llm.generate(&schema, &system, &[ChatMessage::user(user)], &opts),
        )
        .await
        {
            None => return, // gate #1 observes the cancellation
            Some(Ok(generated)) => {
                s.budget.record_tokens(generated.usage.total());
                generated
            }
            Some(Err(failure)) => {
                s.budget.record_tokens(failure.usage.total());
                s.record_tool_failure();
                warn!(step = total, error = %failure, "action generation failed");
                s.diary.push(format!(
                    "At step {total}, you failed to produce a valid action ({failure})."
                ));
                return;
            }
        };

        let action = match decode_action(&generated.value, &s.permissions) {
            Ok(action) => action,
            Err(reason) => {
                s.record_tool_failure();
                warn!(step = total, %reason, "action rejected");
                s.diary.push(format!("At step {total}, your action was rejected: {reason}."));
                return;
            }
        };

        s.action_counts.record(action.kind());
        debug!(step = total, kind = %action.kind(), "dispatching action");

        match action {
            Action::Search { queries, .. } => {
                s.state = ControllerState::Searching { queries: queries.clone() };
                let delta = executor
                    .search_step(
                        total,
                        &current,
                        queries,
                        s.request.search_language_code.clone(),
                        cancel,
                    )
                    .await;
                // New evidence makes coding worthwhile again.
                s.permissions.code = true;
                apply_delta(s, delta, total, settings);
            }
            Action::Visit { urls, .. } => {
                let eligible: Vec<String> = urls
                    .into_iter()
                    .filter(|u| s.ranker.get(u).map_or(true, |rec| rec.is_unvisited()))
                    .collect();
                if eligible.is_empty() {
                    s.diary.push(format!(
                        "At step {total}, you took the **visit** action but every URL \
                         was already visited."
                    ));
                    return;
                }
                s.state = ControllerState::Fetching { urls: eligible.clone() };
                let delta = executor
                    .visit_step(total, eligible, s.request.with_images, cancel)
                    .await;
                s.permissions.code = true;
                apply_delta(s, delta, total, settings);
            }
            Action::Reflect { questions, .. } => {
                s.state = ControllerState::Reflecting { sub_questions: questions.clone() };
                let delta = executor.reflect_step(total, questions, &s.gaps);
                apply_delta(s, delta, total, settings);
            }
            Action::Code { program, .. } => {
                s.state = ControllerState::Coding { program: program.clone() };
                let snapshot = s.knowledge.snapshot();
                let delta = executor.code_step(total, program, snapshot, cancel).await;
                apply_delta(s, delta, total, settings);
            }
            Action::Answer { answer, references, .. } => {
                let draft = AnswerDraft { answer, references };
                self.handle_answer(s, evaluator, analyzer, settings, cancel, total, &current, draft)
                    .await;
            }
        }
    }

    /// The answer path: trivial direct answer, sub-question bookkeeping,
    /// or evaluation with replanning on failure.
    #[allow(clippy::too_many_arguments)]
    async fn handle_answer(
        &self,
        s: &mut Session,
        evaluator: &Evaluator,
        analyzer: &ErrorAnalyzer,
        settings: &ControllerSettings,
        cancel: &CancelToken,
        total: u32,
        current: &str,
        draft: AnswerDraft,
    ) {
        // Conservative default: coding after an answer degrades it.
        s.permissions.code = false;

        if !s.gaps.is_original(current) {
            // Sub-question answers feed the knowledge store unevaluated.
            s.knowledge.append(KnowledgeItem::qa(current.to_string(), draft.answer.clone()));
            s.diary.push(format!(
                "At step {total}, you answered the sub-question \"{current}\"."
            ));
            s.consecutive_tool_failures = 0;
            return;
        }

        if total == 1 && !s.request.no_direct_answer {
            info!("trivial direct answer accepted at step 1");
            finalize_done(s, draft, false);
            return;
        }

        s.state = ControllerState::Evaluating { answer: draft.answer.clone() };

        // Seed the requirement multiset on the first evaluated answer:
        // detected dimensions plus strict, each with max_bad_attempts.
        if !s.requirements_seeded {
            let opts = GenerateOptions { timeout: settings.llm_timeout, ..Default::default() };
            let Some((dims, usage)) =
                with_cancel(cancel, evaluator.detect_requirements(current, &opts)).await
            else {
                return;
            };
            s.budget.record_tokens(usage.total());
            for dim in dims {
                s.requirements.insert(dim, s.request.max_bad_attempts);
            }
            s.requirements.insert(EvalDimension::Strict, s.request.max_bad_attempts);
            s.requirements_seeded = true;
        }

        s.best_answer = Some(draft.clone());

        let opts = GenerateOptions { timeout: settings.llm_timeout, ..Default::default() };
        let Some((outcome, usage)) = with_cancel(
            cancel,
            evaluator.evaluate(current, &draft, &s.knowledge, &s.requirements, &opts),
        )
        .await
        else {
            return;
        };
        s.budget.record_tokens(usage.total());

        match outcome {
            EvalOutcome::Pass => {
                info!(step = total, "answer passed evaluation");
                finalize_done(s, draft, false);
            }
            EvalOutcome::Indeterminate => {
                s.record_tool_failure();
                s.diary.push(format!(
                    "At step {total}, you proposed an answer but the evaluation \
                     could not complete."
                ));
            }
            EvalOutcome::Fail { dimension, reasoning, improvement_plan } => {
                info!(step = total, %dimension, "answer rejected");
                s.consecutive_tool_failures = 0;
                // One decrement per step, first failing dimension only.
                s.requirements.decrement(dimension);
                if let Some(plan) = improvement_plan {
                    s.improvement_plans.push(plan);
                }

                if s.requirements.is_exhausted() {
                    // Give up gracefully with the best candidate so far.
                    info!("evaluation requirements exhausted, returning best answer");
                    let best = s.best_answer.take().unwrap_or(draft);
                    finalize_done(s, best, true);
                    return;
                }

                let Some((analysis, usage)) = with_cancel(
                    cancel,
                    analyzer.analyze(current, &s.diary.render(), &reasoning, &opts),
                )
                .await
                else {
                    return;
                };
                s.budget.record_tokens(usage.total());
                s.knowledge.append(analysis.into_knowledge(current));

                // Replanning reset: narrative goes, knowledge stays.
                s.state = ControllerState::Replanning { analysis: reasoning };
                s.diary.clear();
                s.budget.reset_step_count();
                s.permissions.answer = false;
                s.answer_suppressed_at = Some(s.budget.total_steps());
            }
        }
    }

    /// The guaranteed final attempt: one LLM call, tools forbidden, answer
    /// demanded. Terminates regardless of evaluator verdict.
    async fn beast_mode(&self, s: &mut Session, settings: &ControllerSettings, cancel: &CancelToken) {
        s.state = ControllerState::BeastMode;
        let permissions = Permissions { answer: true, ..Permissions::none() };
        let schema = ActionSchemaBuilder::new(permissions).build();
        let (system, user) = {
            let selected = s.ranker.sort_select(s.request.max_returned_urls);
            let inputs = PromptInputs {
                original: s.gaps.original(),
                current: s.gaps.original(),
                knowledge: &s.knowledge,
                diary: &s.diary,
                urls: &selected,
                improvement_plans: &s.improvement_plans,
                permissions,
                language: s.request.language_code.as_deref(),
            };
            prompt::beast(&inputs)
        };

        let opts = GenerateOptions { timeout: settings.llm_timeout, ..Default::default() };
        let generated = match with_cancel(
            cancel,
            self.llm.generate(&schema, &system, &[ChatMessage::user(user)], &opts),
        )
        .await
        {
            None => {
                s.state = ControllerState::Cancelled {
                    reason: cancel.reason().unwrap_or_else(|| "cancelled".into()),
                };
                return;
            }
            Some(Ok(generated)) => {
                s.budget.record_tokens(generated.usage.total());
                generated
            }
            Some(Err(failure)) => {
                s.budget.record_tokens(failure.usage.total());
                warn!(error = %failure, "beast mode generation failed");
                s.state = ControllerState::Failed { reason: "could not synthesize answer".into() };
                return;
            }
        };

        match decode_action(&generated.value, &permissions) {
            Ok(Action::Answer { answer, references, .. }) => {
                s.action_counts.record(scour_core::ActionKind::Answer);
                finalize_done(s, AnswerDraft { answer, references }, false);
            }
            Ok(_) | Err(_) => {
                s.state = ControllerState::Failed { reason: "could not synthesize answer".into() };
            }
        }
    }
}

/// Race a future against session cancellation. `None` means cancelled.
async fn with_cancel<T>(cancel: &CancelToken, fut: impl Future<Output = T>) -> Option<T> {
    let mut cancel = cancel.clone();
    tokio::select! {
        _ = cancel.cancelled() => None,
        value = fut => Some(value),
    }
}

fn validate(request: &ResearchRequest) -> Result<()> {
    if request.question.trim().is_empty() {
        return Err(ConfigError::Missing("question".into()).into());
    }
    if request.token_budget == 0 {
        return Err(ConfigError::Invalid {
            key: "token_budget".into(),
            reason: "must be positive".into(),
        }
        .into());
    }
    if request.max_steps == 0 {
        return Err(ConfigError::Invalid {
            key: "max_steps".into(),
            reason: "must be positive".into(),
        }
        .into());
    }
    Ok(())
}

/// Apply a step's delta. The single point where step side effects reach
/// session state.
fn apply_delta(s: &mut Session, delta: StepDelta, total: u32, settings: &ControllerSettings) {
    s.budget.record_tokens(delta.usage.total());
    s.knowledge.extend(delta.knowledge);
    if let Some(entry) = delta.diary_entry {
        s.diary.push(entry);
    }
    if !delta.search_hits.is_empty() {
        s.ranker.merge(&delta.search_hits, total);
    }
    for (url, result) in delta.visit_results {
        s.ranker.mark_queued(&url);
        match result {
            Ok(page) => s.ranker.mark_visited(&url, &page),
            Err(error) => s.ranker.mark_failed(&url, &error),
        }
    }
    for gap in delta.new_gaps {
        s.gaps.push_unique(&gap, settings.similarity_threshold);
    }
    if s.gaps.len() > settings.gap_soft_bound {
        s.permissions.reflect = false;
    }
    if let Some(allow) = delta.allow_answer {
        s.permissions.answer = allow;
        if allow {
            s.answer_suppressed_at = None;
        }
    }
    if let Some(allow) = delta.allow_reflect {
        s.permissions.reflect = allow;
    }
    if delta.tool_failure {
        s.record_tool_failure();
    } else {
        s.consecutive_tool_failures = 0;
    }
}

/// Resolve the LLM's answer references against the ranker's records and
/// transition to `Done`.
fn finalize_done(s: &mut Session, draft: AnswerDraft, is_best: bool) {
    let mut references = Vec::new();
    for r in &draft.references {
        let Some(canonical) = UrlRanker::canonicalize(&r.url) else {
            continue;
        };
        let record = s.ranker.get(&r.url);
        let relevance = record.and_then(|rec| rec.rerank_score).unwrap_or(1.0);
        if relevance < s.request.min_relevance_score {
            continue;
        }
        references.push(Reference {
            url: canonical,
            exact_quote: r.exact_quote.clone(),
            title: record.map(|rec| rec.title.clone()).unwrap_or_default(),
            published_at: record.and_then(|rec| rec.published_at.clone()),
            relevance_score: relevance,
        });
        if references.len() >= s.request.max_references {
            break;
        }
    }
    s.gave_up = is_best;
    s.state = ControllerState::Done { answer: draft.answer, references };
}

fn build_result(s: Session) -> ResearchResult {
    let metrics = Metrics {
        total_steps: s.budget.total_steps(),
        tokens_used: s.budget.tokens_used(),
        duration_ms: s.budget.elapsed().as_millis() as u64,
        action_counts: s.action_counts,
        tool_failure_count: s.total_tool_failures,
    };
    match s.state {
        ControllerState::Done { answer, references } => ResearchResult {
            answer,
            is_final: true,
            is_best: s.gave_up,
            references,
            visited_urls: s.ranker.visited_urls(),
            read_urls: s.ranker.read_urls(),
            all_urls: s.ranker.all_urls(),
            knowledge: s.knowledge.all().to_vec(),
            metrics,
        },
        ControllerState::Failed { reason } => {
            warn!(%reason, "session failed, returning partial state");
            ResearchResult {
                answer: String::new(),
                is_final: false,
                is_best: false,
                references: Vec::new(),
                visited_urls: s.ranker.visited_urls(),
                read_urls: s.ranker.read_urls(),
                all_urls: s.ranker.all_urls(),
                knowledge: s.knowledge.all().to_vec(),
                metrics,
            }
        }
        other => {
            // Unreachable by construction; fail closed rather than panic.
            warn!(state = other.name(), "result built from non-terminal state");
            ResearchResult {
                answer: String::new(),
                is_final: false,
                is_best: false,
                references: Vec::new(),
                visited_urls: s.ranker.visited_urls(),
                read_urls: s.ranker.read_urls(),
                all_urls: s.ranker.all_urls(),
                knowledge: s.knowledge.all().to_vec(),
                metrics,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_empty_question() {
        let request = ResearchRequest::new("  ");
        assert!(matches!(validate(&request), Err(Error::Config(ConfigError::Missing(_)))));
    }

    #[test]
    fn validate_rejects_zero_budget() {
        let mut request = ResearchRequest::new("q");
        request.token_budget = 0;
        assert!(matches!(validate(&request), Err(Error::Config(ConfigError::Invalid { .. }))));
    }

    #[test]
    fn gate_reasons_are_stable() {
        assert_eq!(GateFired::TokenBudget.reason(), "token budget threshold reached");
        assert_eq!(GateFired::NoPermittedAction.reason(), "no action is permitted");
    }

    #[test]
    fn session_starts_with_all_permissions() {
        let s = Session::new(ResearchRequest::new("q"), &ControllerSettings::default());
        assert!(s.permissions.any());
        assert!(matches!(s.state, ControllerState::Idle));
        assert_eq!(s.gaps.len(), 1);
    }
}
