//! OpenAI-compatible vendor client.
//!
//! Works with OpenAI, OpenRouter, and any endpoint exposing
//! `/chat/completions`. Uses `response_format: json_schema` for native
//! structured output when the request carries a schema.

use crate::vendor::{ChatVendor, VendorRequest, VendorResponse};
use async_trait::async_trait;
use scour_core::{ChatRole, LlmError, TokenUsage};
use serde::Deserialize;
use tracing::{debug, warn};

const DEFAULT_MAX_TOKENS: u32 = 4096;

/// An OpenAI-compatible chat vendor.
pub struct OpenAiCompatClient {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiCompatClient {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            client,
        }
    }

    /// OpenAI convenience constructor.
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key, model)
    }

    /// OpenRouter convenience constructor.
    pub fn openrouter(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new("openrouter", "https://openrouter.ai/api/v1", api_key, model)
    }

    fn to_api_messages(request: &VendorRequest) -> Vec<serde_json::Value> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if !request.system.is_empty() {
            messages.push(serde_json::json!({ "role": "system", "content": request.system }));
        }
        for m in &request.messages {
            let role = match m.role {
                ChatRole::System => "system",
                ChatRole::User => "user",
                ChatRole::Assistant => "assistant",
            };
            messages.push(serde_json::json!({ "role": role, "content": m.content }));
        }
        messages
    }
}

#[async_trait]
impl ChatVendor for OpenAiCompatClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat(&self, request: &VendorRequest) -> Result<VendorResponse, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": Self::to_api_messages(request),
            "temperature": request.temperature,
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        });

        if let Some(schema) = &request.schema {
            body["response_format"] = serde_json::json!({
                "type": "json_schema",
                "json_schema": {
                    "name": request.schema_name.as_deref().unwrap_or("reply"),
                    "schema": schema,
                    "strict": false
                }
            });
        }

        debug!(vendor = %self.name, model = %self.model, "sending chat completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(e.to_string())
                } else {
                    LlmError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();

        if status == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(5);
            return Err(LlmError::RateLimited { retry_after_secs });
        }
        if status == 401 || status == 403 {
            return Err(LlmError::AuthenticationFailed(format!(
                "vendor '{}' rejected the API key",
                self.name
            )));
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(vendor = %self.name, status, body = %error_body, "chat completion error");
            return Err(LlmError::ApiError { status_code: status, message: error_body });
        }

        let api: ApiResponse = response.json().await.map_err(|e| LlmError::ApiError {
            status_code: 200,
            message: format!("failed to parse completion response: {e}"),
        })?;

        let text = api
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();
        let usage = api
            .usage
            .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        Ok(VendorResponse { text, usage })
    }
}

// --- OpenAI API types ---

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use scour_core::ChatMessage;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request_with_schema() -> VendorRequest {
        VendorRequest {
            system: "be terse".into(),
            messages: vec![ChatMessage::user("choose an action")],
            schema_name: Some("action".into()),
            schema: Some(serde_json::json!({"type": "object"})),
            temperature: 0.7,
            max_tokens: None,
        }
    }

    fn completion_body(content: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }],
            "usage": { "prompt_tokens": 100, "completion_tokens": 20 }
        })
    }

    #[tokio::test]
    async fn sends_schema_as_response_format() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "response_format": { "type": "json_schema" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("{}")))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiCompatClient::new("test", server.uri(), "sk-test", "gpt-4o");
        let resp = client.chat(&request_with_schema()).await.unwrap();
        assert_eq!(resp.text, "{}");
        assert_eq!(resp.usage.total(), 120);
    }

    #[tokio::test]
    async fn rate_limit_carries_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "17"))
            .mount(&server)
            .await;

        let client = OpenAiCompatClient::new("test", server.uri(), "sk-test", "gpt-4o");
        match client.chat(&request_with_schema()).await.unwrap_err() {
            LlmError::RateLimited { retry_after_secs } => assert_eq!(retry_after_secs, 17),
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn auth_failure_is_not_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = OpenAiCompatClient::new("test", server.uri(), "bad", "gpt-4o");
        assert!(matches!(
            client.chat(&request_with_schema()).await.unwrap_err(),
            LlmError::AuthenticationFailed(_)
        ));
    }

    #[tokio::test]
    async fn server_error_is_retryable_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let client = OpenAiCompatClient::new("test", server.uri(), "sk-test", "gpt-4o");
        let err = client.chat(&request_with_schema()).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(err, LlmError::ApiError { status_code: 503, .. }));
    }

    #[tokio::test]
    async fn client_error_is_not_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .mount(&server)
            .await;

        let client = OpenAiCompatClient::new("test", server.uri(), "sk-test", "gpt-4o");
        let err = client.chat(&request_with_schema()).await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn system_message_goes_first() {
        let messages = OpenAiCompatClient::to_api_messages(&request_with_schema());
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["role"], "user");
    }
}
