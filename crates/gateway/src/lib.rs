//! HTTP gateway for scour.
//!
//! Adapts an OpenAI-style `/v1/chat/completions` endpoint onto research
//! sessions: the last user message becomes the question, the reply is a
//! non-streaming chat completion whose content is the answer followed by
//! its references. One request drives one session.
//!
//! Built on Axum; request tracing via tower-http.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use scour_agent::ResearchController;
use scour_config::ResearchDefaults;
use scour_core::{CancelToken, Error, Reference, ResearchRequest, ResearchResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Shared state for the gateway.
pub struct GatewayState {
    pub controller: Arc<ResearchController>,
    pub defaults: ResearchDefaults,
}

type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/v1/chat/completions", post(chat_handler))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

// --- OpenAI chat shapes ---

#[derive(Debug, Deserialize)]
pub struct ChatCompletionRequest {
    #[serde(default)]
    pub model: Option<String>,
    pub messages: Vec<ChatRequestMessage>,
    /// Scour extension: per-request research knobs.
    #[serde(default)]
    pub budget_tokens: Option<u64>,
    #[serde(default)]
    pub max_bad_attempts: Option<u32>,
    #[serde(default)]
    pub no_direct_answer: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequestMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: &'static str,
    pub model: String,
    pub choices: Vec<ChatChoice>,
    pub usage: ChatUsage,
}

#[derive(Debug, Serialize)]
pub struct ChatChoice {
    pub index: u32,
    pub message: ChatResponseMessage,
    pub finish_reason: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ChatResponseMessage {
    pub role: &'static str,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct ChatUsage {
    pub total_tokens: u64,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

async fn chat_handler(
    State(state): State<SharedState>,
    Json(body): Json<ChatCompletionRequest>,
) -> Result<Json<ChatCompletionResponse>, (StatusCode, Json<ErrorBody>)> {
    let question = body
        .messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.trim().to_string())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody { error: "no user message in request".into() }),
            )
        })?;

    let request = build_request(&question, &state.defaults, &body);
    info!(question = %question, "gateway research request");

    let result = state
        .controller
        .research(request, CancelToken::never())
        .await
        .map_err(|e| match e {
            Error::Config(config) => {
                (StatusCode::BAD_REQUEST, Json(ErrorBody { error: config.to_string() }))
            }
            other => {
                warn!(error = %other, "research session failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorBody { error: other.to_string() }),
                )
            }
        })?;

    Ok(Json(to_chat_response(
        body.model.unwrap_or_else(|| "scour".into()),
        result,
    )))
}

/// Map the chat request onto a research request over the config defaults.
fn build_request(
    question: &str,
    defaults: &ResearchDefaults,
    body: &ChatCompletionRequest,
) -> ResearchRequest {
    let mut request = ResearchRequest::new(question);
    request.token_budget = body.budget_tokens.unwrap_or(defaults.token_budget);
    request.max_steps = defaults.max_steps;
    request.max_duration_ms = defaults.max_duration_ms;
    request.max_bad_attempts = body.max_bad_attempts.unwrap_or(defaults.max_bad_attempts);
    request.no_direct_answer = body.no_direct_answer.unwrap_or(false);
    request
}

fn to_chat_response(model: String, result: ResearchResult) -> ChatCompletionResponse {
    let mut content = result.answer.clone();
    if !result.references.is_empty() {
        content.push_str("\n\nReferences:\n");
        for r in &result.references {
            content.push_str(&render_reference(r));
        }
    }
    let finish_reason = if result.is_final { "stop" } else { "length" };

    ChatCompletionResponse {
        id: format!("chatcmpl-{}", uuid::Uuid::new_v4()),
        object: "chat.completion",
        model,
        choices: vec![ChatChoice {
            index: 0,
            message: ChatResponseMessage { role: "assistant", content },
            finish_reason,
        }],
        usage: ChatUsage { total_tokens: result.metrics.tokens_used },
    }
}

fn render_reference(r: &Reference) -> String {
    if r.exact_quote.is_empty() {
        format!("- {}\n", r.url)
    } else {
        format!("- {} — \"{}\"\n", r.url, r.exact_quote)
    }
}
