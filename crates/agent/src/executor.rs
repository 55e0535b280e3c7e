//! Step executor — one handler per action type.
//!
//! Handlers are pure with respect to their inputs plus declared side
//! effects: each returns a [`StepDelta`] describing what happened, and the
//! controller — the only writer — applies it. I/O inside a step fans out
//! concurrently but results are collected in input order, so identical
//! runs produce identical state.

use crate::gaps::{similarity, GapQueue};
use crate::prompt;
use crate::settings::ControllerSettings;
use futures::future::join_all;
use scour_core::{
    CancelToken, ChatMessage, CodeRunner, FetchOptions, FetchPort, FetchedPage, GenerateOptions,
    KnowledgeItem, LlmPort, SchemaSpec, SearchHit, SearchPort, SearchQuery, TokenUsage,
};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// The state changes one step produced. Applied atomically by the
/// controller after the step's join point.
#[derive(Debug, Default)]
pub struct StepDelta {
    pub knowledge: Vec<KnowledgeItem>,
    pub diary_entry: Option<String>,
    /// Sub-questions reflect wants to add (already deduplicated/capped).
    pub new_gaps: Vec<String>,
    /// Search results to merge into the URL ranker.
    pub search_hits: Vec<SearchHit>,
    /// Per-URL visit outcomes, in input order. Cancelled fetches are
    /// absent entirely so they never count as attempts.
    pub visit_results: Vec<(String, Result<FetchedPage, String>)>,
    pub allow_answer: Option<bool>,
    pub allow_reflect: Option<bool>,
    /// This step failed as a tool (all I/O failed, or validation did).
    pub tool_failure: bool,
    /// Tokens consumed by sub-calls (query rewriting).
    pub usage: TokenUsage,
}

/// How one guarded outbound call ended.
enum CallOutcome<T> {
    Ok(T),
    Failed(String),
    TimedOut,
    Cancelled,
}

/// Runs the per-action handlers against the tool ports.
pub struct StepExecutor {
    llm: Arc<dyn LlmPort>,
    search: Arc<dyn SearchPort>,
    fetch: Arc<dyn FetchPort>,
    code: Arc<dyn CodeRunner>,
    settings: ControllerSettings,
}

impl StepExecutor {
    pub fn new(
        llm: Arc<dyn LlmPort>,
        search: Arc<dyn SearchPort>,
        fetch: Arc<dyn FetchPort>,
        code: Arc<dyn CodeRunner>,
        settings: ControllerSettings,
    ) -> Self {
        Self { llm, search, fetch, code, settings }
    }

    /// **search**: rewrite queries, fan out over the search port, merge
    /// results. Re-enables answering.
    pub async fn search_step(
        &self,
        step: u32,
        question: &str,
        queries: Vec<String>,
        language: Option<String>,
        cancel: &CancelToken,
    ) -> StepDelta {
        let mut delta = StepDelta::default();
        let mut queries: Vec<String> = queries
            .into_iter()
            .filter(|q| !q.trim().is_empty())
            .take(self.settings.max_queries_per_step)
            .collect();

        // Best-effort rewrite; the originals stand on any failure.
        let rewrite_usage = self.rewrite_queries(question, &mut queries, cancel).await;
        delta.usage.add(rewrite_usage);

        let futures: Vec<_> = queries
            .iter()
            .map(|q| {
                let query = SearchQuery {
                    query: q.clone(),
                    language: language.clone(),
                    num_results: 10,
                };
                guard(self.settings.search_timeout, cancel, async move {
                    self.search.query(&query).await
                })
            })
            .collect();
        let outcomes = join_all(futures).await;

        let mut failures = 0usize;
        let mut completed = 0usize;
        for (q, outcome) in queries.iter().zip(outcomes) {
            match outcome {
                CallOutcome::Ok(hits) => {
                    completed += 1;
                    if !hits.is_empty() {
                        let summary = hits
                            .iter()
                            .take(5)
                            .map(|h| format!("{} — {} ({})", h.title, h.snippet, h.url))
                            .collect::<Vec<_>>()
                            .join("; ");
                        delta.knowledge.push(KnowledgeItem::side_info(q.clone(), summary));
                    }
                    delta.search_hits.extend(hits);
                }
                CallOutcome::Failed(e) => {
                    completed += 1;
                    failures += 1;
                    warn!(query = %q, error = %e, "search query failed");
                }
                CallOutcome::TimedOut => {
                    completed += 1;
                    failures += 1;
                    warn!(query = %q, "search query timed out");
                }
                CallOutcome::Cancelled => {}
            }
        }

        delta.tool_failure = completed > 0 && failures == completed;
        delta.allow_answer = Some(true);
        delta.diary_entry = Some(format!(
            "At step {step}, you took the **search** action and looked up: {}.\n\
             You found {} results.",
            queries.iter().map(|q| format!("\"{q}\"")).collect::<Vec<_>>().join(", "),
            delta.search_hits.len(),
        ));
        debug!(step, hits = delta.search_hits.len(), failures, "search step complete");
        delta
    }

    async fn rewrite_queries(
        &self,
        question: &str,
        queries: &mut Vec<String>,
        _cancel: &CancelToken,
    ) -> TokenUsage {
        let schema = query_rewrite_schema(self.settings.max_queries_per_step);
        let (system, user) = prompt::query_rewrite(question, queries);
        let opts = GenerateOptions { timeout: self.settings.llm_timeout, ..Default::default() };

        match self.llm.generate(&schema, &system, &[ChatMessage::user(user)], &opts).await {
            Ok(generated) => {
                if let Some(rewritten) = generated.value.get("queries").and_then(|v| v.as_array()) {
                    let cleaned: Vec<String> = rewritten
                        .iter()
                        .filter_map(|v| v.as_str())
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .take(self.settings.max_queries_per_step)
                        .collect();
                    if !cleaned.is_empty() {
                        *queries = cleaned;
                    }
                }
                generated.usage
            }
            Err(failure) => {
                debug!(error = %failure, "query rewrite failed, keeping originals");
                failure.usage
            }
        }
    }

    /// **visit**: fetch each URL concurrently, extract text, record
    /// content. Re-enables answering. The controller pre-filters URLs
    /// already visited or failed.
    pub async fn visit_step(
        &self,
        step: u32,
        urls: Vec<String>,
        with_images: bool,
        cancel: &CancelToken,
    ) -> StepDelta {
        let mut delta = StepDelta::default();
        let urls: Vec<String> = urls.into_iter().take(self.settings.max_urls_per_step).collect();

        let opts = FetchOptions {
            timeout: self.settings.fetch_timeout,
            with_images,
            ..Default::default()
        };
        let futures: Vec<_> = urls
            .iter()
            .map(|url| {
                let opts = opts.clone();
                guard(self.settings.fetch_timeout, cancel, async move {
                    self.fetch.fetch(url, &opts).await
                })
            })
            .collect();
        let outcomes = join_all(futures).await;

        let mut read = 0usize;
        let mut failures = 0usize;
        for (url, outcome) in urls.iter().zip(outcomes) {
            match outcome {
                CallOutcome::Ok(page) => {
                    read += 1;
                    let excerpt = excerpt(&page.content_text, self.settings.knowledge_excerpt_chars);
                    delta.knowledge.push(KnowledgeItem::url(
                        format!("What is on {url}?"),
                        excerpt,
                    ));
                    delta.visit_results.push((url.clone(), Ok(page)));
                }
                CallOutcome::Failed(e) => {
                    failures += 1;
                    delta.visit_results.push((url.clone(), Err(e)));
                }
                CallOutcome::TimedOut => {
                    failures += 1;
                    delta.visit_results.push((url.clone(), Err("fetch timed out".into())));
                }
                // Cancelled fetches are not attempts; the gate handles exit.
                CallOutcome::Cancelled => {}
            }
        }

        delta.tool_failure = !urls.is_empty() && read == 0 && failures > 0;
        delta.allow_answer = Some(true);
        delta.diary_entry = Some(format!(
            "At step {step}, you took the **visit** action and read {read} of {} URLs:\n{}",
            urls.len(),
            urls.iter().map(|u| format!("- {u}")).collect::<Vec<_>>().join("\n"),
        ));
        debug!(step, read, failures, "visit step complete");
        delta
    }

    /// **reflect**: add unique sub-questions to the gap queue, capped per
    /// step. Pure — no I/O.
    pub fn reflect_step(
        &self,
        step: u32,
        questions: Vec<String>,
        existing: &GapQueue,
    ) -> StepDelta {
        let mut delta = StepDelta::default();
        let threshold = self.settings.similarity_threshold;

        for q in questions {
            let q = q.trim().to_string();
            if q.is_empty() || delta.new_gaps.len() >= self.settings.max_gaps_per_step {
                continue;
            }
            let dup_existing = existing.all().iter().any(|g| similarity(g, &q) >= threshold);
            let dup_batch = delta.new_gaps.iter().any(|g| similarity(g, &q) >= threshold);
            if !dup_existing && !dup_batch {
                delta.new_gaps.push(q);
            }
        }

        if delta.new_gaps.is_empty() {
            // Nothing new came out of reflection; stop it from looping.
            delta.allow_reflect = Some(false);
            delta.diary_entry = Some(format!(
                "At step {step}, you took the **reflect** action but every \
                 sub-question duplicated one already in the queue.",
            ));
        } else {
            delta.diary_entry = Some(format!(
                "At step {step}, you took the **reflect** action and added sub-questions:\n{}",
                delta.new_gaps.iter().map(|q| format!("- {q}")).collect::<Vec<_>>().join("\n"),
            ));
        }
        delta
    }

    /// **code**: run a program against the knowledge snapshot in the
    /// isolated runner.
    pub async fn code_step(
        &self,
        step: u32,
        program: String,
        snapshot: serde_json::Value,
        cancel: &CancelToken,
    ) -> StepDelta {
        let mut delta = StepDelta::default();
        let limits = self.settings.code_limits.clone();
        // Slack over the runner's own wall cap so its timeout fires first.
        let outer = limits.wall + Duration::from_secs(1);

        let outcome = guard(outer, cancel, async {
            self.code.run(&program, &snapshot, &limits).await
        })
        .await;

        match outcome {
            CallOutcome::Ok(output) => {
                if output.exit_ok {
                    delta.knowledge.push(KnowledgeItem::qa(
                        format!("What does this program output?\n{program}"),
                        output.stdout.clone(),
                    ));
                    delta.diary_entry = Some(format!(
                        "At step {step}, you took the **code** action; the program printed:\n{}",
                        excerpt(&output.stdout, 500),
                    ));
                } else {
                    delta.knowledge.push(KnowledgeItem::side_info(
                        format!("What went wrong running this program?\n{program}"),
                        output.stderr.clone(),
                    ));
                    delta.diary_entry = Some(format!(
                        "At step {step}, you took the **code** action but the program errored:\n{}",
                        excerpt(&output.stderr, 500),
                    ));
                }
            }
            CallOutcome::Failed(e) => {
                delta.tool_failure = true;
                delta.diary_entry = Some(format!(
                    "At step {step}, you took the **code** action but the runner failed: {e}",
                ));
            }
            CallOutcome::TimedOut => {
                delta.tool_failure = true;
                delta.diary_entry = Some(format!(
                    "At step {step}, you took the **code** action but it timed out.",
                ));
            }
            CallOutcome::Cancelled => {}
        }
        delta
    }
}

/// Race an outbound call against its timeout and session cancellation.
async fn guard<T, E, F>(timeout: Duration, cancel: &CancelToken, fut: F) -> CallOutcome<T>
where
    E: std::fmt::Display,
    F: Future<Output = Result<T, E>>,
{
    let mut cancel = cancel.clone();
    tokio::select! {
        _ = cancel.cancelled() => CallOutcome::Cancelled,
        result = tokio::time::timeout(timeout, fut) => match result {
            Err(_) => CallOutcome::TimedOut,
            Ok(Ok(value)) => CallOutcome::Ok(value),
            Ok(Err(e)) => CallOutcome::Failed(e.to_string()),
        },
    }
}

fn query_rewrite_schema(max: usize) -> SchemaSpec {
    SchemaSpec::new(
        "query-rewriter",
        json!({
            "type": "object",
            "properties": {
                "think": { "type": "string" },
                "queries": {
                    "type": "array",
                    "items": { "type": "string" },
                    "minItems": 1,
                    "maxItems": max
                }
            },
            "required": ["think", "queries"]
        }),
    )
}

fn excerpt(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{cut}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use scour_core::{
        CodeError, CodeLimits, CodeOutput, FetchError, Generated, LlmFailure, SearchError,
    };
    use std::sync::Mutex;

    struct NoLlm;

    #[async_trait]
    impl LlmPort for NoLlm {
        fn name(&self) -> &str {
            "none"
        }
        async fn generate(
            &self,
            _schema: &SchemaSpec,
            _system: &str,
            _messages: &[ChatMessage],
            _opts: &GenerateOptions,
        ) -> Result<Generated, LlmFailure> {
            Err(LlmFailure::new(
                scour_core::LlmError::NotConfigured("test".into()),
                TokenUsage::default(),
            ))
        }
    }

    struct StubSearch {
        hits_per_query: usize,
        fail: bool,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SearchPort for StubSearch {
        fn name(&self) -> &str {
            "stub"
        }
        async fn query(&self, q: &SearchQuery) -> Result<Vec<SearchHit>, SearchError> {
            self.calls.lock().unwrap().push(q.query.clone());
            if self.fail {
                return Err(SearchError::Network("down".into()));
            }
            Ok((0..self.hits_per_query)
                .map(|i| SearchHit {
                    url: format!("https://example.com/{}/{}", q.query.replace(' ', "-"), i),
                    title: format!("Result {i}"),
                    snippet: "snippet".into(),
                    published_at: None,
                    rerank_score: None,
                })
                .collect())
        }
    }

    struct StubFetch {
        fail_hosts: Vec<String>,
    }

    #[async_trait]
    impl FetchPort for StubFetch {
        async fn fetch(&self, url: &str, _opts: &FetchOptions) -> Result<FetchedPage, FetchError> {
            if self.fail_hosts.iter().any(|h| url.contains(h.as_str())) {
                return Err(FetchError::Http { status: 500, url: url.into() });
            }
            Ok(FetchedPage {
                content_text: format!("content of {url}"),
                title: Some("Title".into()),
                published_at: None,
                final_url: url.into(),
            })
        }
    }

    struct StubCode {
        output: Result<CodeOutput, CodeError>,
    }

    #[async_trait]
    impl CodeRunner for StubCode {
        async fn run(
            &self,
            _program: &str,
            _inputs: &serde_json::Value,
            _limits: &CodeLimits,
        ) -> Result<CodeOutput, CodeError> {
            self.output.clone()
        }
    }

    fn executor(search: StubSearch, fetch: StubFetch, code: StubCode) -> StepExecutor {
        StepExecutor::new(
            Arc::new(NoLlm),
            Arc::new(search),
            Arc::new(fetch),
            Arc::new(code),
            ControllerSettings::default(),
        )
    }

    fn ok_code() -> StubCode {
        StubCode {
            output: Ok(CodeOutput { stdout: "42".into(), stderr: String::new(), exit_ok: true }),
        }
    }

    #[tokio::test]
    async fn search_step_merges_hits_in_query_order() {
        let exec = executor(
            StubSearch { hits_per_query: 2, fail: false, calls: Mutex::new(vec![]) },
            StubFetch { fail_hosts: vec![] },
            ok_code(),
        );
        let delta = exec
            .search_step(1, "q", vec!["alpha".into(), "beta".into()], None, &CancelToken::never())
            .await;

        assert_eq!(delta.search_hits.len(), 4);
        assert!(delta.search_hits[0].url.contains("alpha"));
        assert!(delta.search_hits[2].url.contains("beta"));
        assert_eq!(delta.allow_answer, Some(true));
        assert!(!delta.tool_failure);
        assert!(delta.diary_entry.unwrap().contains("**search**"));
        assert_eq!(delta.knowledge.len(), 2);
    }

    #[tokio::test]
    async fn search_step_all_failures_is_tool_failure() {
        let exec = executor(
            StubSearch { hits_per_query: 0, fail: true, calls: Mutex::new(vec![]) },
            StubFetch { fail_hosts: vec![] },
            ok_code(),
        );
        let delta = exec
            .search_step(1, "q", vec!["alpha".into()], None, &CancelToken::never())
            .await;
        assert!(delta.tool_failure);
        assert!(delta.search_hits.is_empty());
    }

    #[tokio::test]
    async fn search_step_caps_queries() {
        let search = StubSearch { hits_per_query: 1, fail: false, calls: Mutex::new(vec![]) };
        let exec = executor(search, StubFetch { fail_hosts: vec![] }, ok_code());
        let queries = (0..10).map(|i| format!("query {i}")).collect();
        let delta = exec.search_step(1, "q", queries, None, &CancelToken::never()).await;
        assert_eq!(delta.search_hits.len(), 5);
    }

    #[tokio::test]
    async fn visit_step_records_content_and_failures_in_order() {
        let exec = executor(
            StubSearch { hits_per_query: 0, fail: false, calls: Mutex::new(vec![]) },
            StubFetch { fail_hosts: vec!["bad.example".into()] },
            ok_code(),
        );
        let delta = exec
            .visit_step(
                2,
                vec!["https://ok.example/a".into(), "https://bad.example/b".into()],
                false,
                &CancelToken::never(),
            )
            .await;

        assert_eq!(delta.visit_results.len(), 2);
        assert_eq!(delta.visit_results[0].0, "https://ok.example/a");
        assert!(delta.visit_results[0].1.is_ok());
        assert!(delta.visit_results[1].1.is_err());
        assert_eq!(delta.knowledge.len(), 1);
        assert!(!delta.tool_failure);
        assert_eq!(delta.allow_answer, Some(true));
    }

    #[tokio::test]
    async fn visit_step_all_failed_is_tool_failure() {
        let exec = executor(
            StubSearch { hits_per_query: 0, fail: false, calls: Mutex::new(vec![]) },
            StubFetch { fail_hosts: vec!["bad.example".into()] },
            ok_code(),
        );
        let delta = exec
            .visit_step(2, vec!["https://bad.example/a".into()], false, &CancelToken::never())
            .await;
        assert!(delta.tool_failure);
    }

    #[tokio::test]
    async fn cancelled_visit_produces_no_attempts() {
        let (handle, token) = scour_core::cancel_pair();
        handle.cancel("caller aborted");
        let exec = executor(
            StubSearch { hits_per_query: 0, fail: false, calls: Mutex::new(vec![]) },
            StubFetch { fail_hosts: vec![] },
            ok_code(),
        );
        let delta = exec
            .visit_step(2, vec!["https://ok.example/a".into()], false, &token)
            .await;
        assert!(delta.visit_results.is_empty());
        assert!(!delta.tool_failure);
    }

    #[test]
    fn reflect_step_dedups_and_caps() {
        let exec = executor(
            StubSearch { hits_per_query: 0, fail: false, calls: Mutex::new(vec![]) },
            StubFetch { fail_hosts: vec![] },
            ok_code(),
        );
        let gaps = GapQueue::new("who wrote the rust book?");
        let delta = exec.reflect_step(
            3,
            vec![
                "Who wrote the Rust book".into(), // dup of original
                "when was the rust book published?".into(),
                "when was the rust book published".into(), // dup in batch
                "what edition is current?".into(),
            ],
            &gaps,
        );
        assert_eq!(
            delta.new_gaps,
            vec!["when was the rust book published?".to_string(), "what edition is current?".to_string()]
        );
        assert!(delta.allow_reflect.is_none());
    }

    #[test]
    fn reflect_step_all_duplicates_disables_reflect() {
        let exec = executor(
            StubSearch { hits_per_query: 0, fail: false, calls: Mutex::new(vec![]) },
            StubFetch { fail_hosts: vec![] },
            ok_code(),
        );
        let gaps = GapQueue::new("who wrote the rust book?");
        let delta = exec.reflect_step(3, vec!["who wrote the rust book".into()], &gaps);
        assert!(delta.new_gaps.is_empty());
        assert_eq!(delta.allow_reflect, Some(false));
    }

    #[tokio::test]
    async fn code_step_records_stdout() {
        let exec = executor(
            StubSearch { hits_per_query: 0, fail: false, calls: Mutex::new(vec![]) },
            StubFetch { fail_hosts: vec![] },
            ok_code(),
        );
        let delta = exec
            .code_step(4, "6 * 7".into(), serde_json::json!({}), &CancelToken::never())
            .await;
        assert_eq!(delta.knowledge.len(), 1);
        assert_eq!(delta.knowledge[0].answer, "42");
        assert!(!delta.tool_failure);
    }

    #[tokio::test]
    async fn code_step_runner_error_is_tool_failure() {
        let exec = executor(
            StubSearch { hits_per_query: 0, fail: false, calls: Mutex::new(vec![]) },
            StubFetch { fail_hosts: vec![] },
            StubCode { output: Err(CodeError::FuelExhausted(100_000)) },
        );
        let delta = exec
            .code_step(4, "while true".into(), serde_json::json!({}), &CancelToken::never())
            .await;
        assert!(delta.tool_failure);
        assert!(delta.knowledge.is_empty());
    }
}
