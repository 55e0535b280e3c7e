//! Anthropic native vendor client.
//!
//! Uses the Messages API directly: `x-api-key` auth, `anthropic-version`
//! header, system prompt as a top-level field. Structured output is
//! obtained by forcing a single tool call whose input schema is the
//! requested schema; the tool input comes back as the completion text.

use crate::vendor::{ChatVendor, VendorRequest, VendorResponse};
use async_trait::async_trait;
use scour_core::{ChatRole, LlmError, TokenUsage};
use serde::Deserialize;
use tracing::{debug, warn};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic Messages API vendor.
pub struct AnthropicClient {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            name: "anthropic".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            model: model.into(),
            client,
        }
    }

    /// Custom base URL (testing, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn to_api_messages(request: &VendorRequest) -> Vec<serde_json::Value> {
        request
            .messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    // Anthropic has no system role inside messages.
                    ChatRole::System | ChatRole::User => "user",
                    ChatRole::Assistant => "assistant",
                };
                serde_json::json!({ "role": role, "content": m.content })
            })
            .collect()
    }
}

#[async_trait]
impl ChatVendor for AnthropicClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat(&self, request: &VendorRequest) -> Result<VendorResponse, LlmError> {
        let url = format!("{}/v1/messages", self.base_url);

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": Self::to_api_messages(request),
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "temperature": request.temperature,
        });
        if !request.system.is_empty() {
            body["system"] = serde_json::json!(request.system);
        }

        // Forced tool use carries the schema.
        if let Some(schema) = &request.schema {
            let tool_name = request.schema_name.as_deref().unwrap_or("reply");
            body["tools"] = serde_json::json!([{
                "name": tool_name,
                "description": "Emit the structured reply.",
                "input_schema": schema,
            }]);
            body["tool_choice"] = serde_json::json!({ "type": "tool", "name": tool_name });
        }

        debug!(vendor = %self.name, model = %self.model, "sending messages request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
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
            return Err(LlmError::AuthenticationFailed("invalid Anthropic API key".into()));
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Anthropic API error");
            return Err(LlmError::ApiError { status_code: status, message: error_body });
        }

        let api: ApiResponse = response.json().await.map_err(|e| LlmError::ApiError {
            status_code: 200,
            message: format!("failed to parse Anthropic response: {e}"),
        })?;

        // Prefer the forced tool input; fall back to concatenated text.
        let mut text = String::new();
        for block in &api.content {
            match block {
                ContentBlock::ToolUse { input, .. } => {
                    text = serde_json::to_string(input).unwrap_or_default();
                    break;
                }
                ContentBlock::Text { text: t } => {
                    if !text.is_empty() {
                        text.push('\n');
                    }
                    text.push_str(t);
                }
            }
        }

        Ok(VendorResponse {
            text,
            usage: TokenUsage::new(api.usage.input_tokens, api.usage.output_tokens),
        })
    }
}

// --- Anthropic API types ---

#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
    usage: ApiUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        #[allow(dead_code)]
        name: String,
        input: serde_json::Value,
    },
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    input_tokens: u64,
    output_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use scour_core::ChatMessage;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn schema_request() -> VendorRequest {
        VendorRequest {
            system: "be terse".into(),
            messages: vec![ChatMessage::user("choose")],
            schema_name: Some("action".into()),
            schema: Some(serde_json::json!({"type": "object"})),
            temperature: 0.5,
            max_tokens: None,
        }
    }

    #[tokio::test]
    async fn forced_tool_use_returns_input_as_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-ant-test"))
            .and(body_partial_json(serde_json::json!({
                "tool_choice": { "type": "tool", "name": "action" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [
                    { "type": "tool_use", "name": "action", "input": { "action": "answer", "think": "t", "answer": "4" } }
                ],
                "usage": { "input_tokens": 50, "output_tokens": 10 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = AnthropicClient::new("sk-ant-test", "claude-sonnet-4-20250514")
            .with_base_url(server.uri());
        let resp = client.chat(&schema_request()).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&resp.text).unwrap();
        assert_eq!(value["answer"], "4");
        assert_eq!(resp.usage.total(), 60);
    }

    #[tokio::test]
    async fn plain_text_without_schema() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [{ "type": "text", "text": "hello" }],
                "usage": { "input_tokens": 5, "output_tokens": 2 }
            })))
            .mount(&server)
            .await;

        let client =
            AnthropicClient::new("sk-ant-test", "claude-sonnet-4-20250514").with_base_url(server.uri());
        let request = VendorRequest::text_only("sys", vec![ChatMessage::user("hi")]);
        let resp = client.chat(&request).await.unwrap();
        assert_eq!(resp.text, "hello");
    }

    #[tokio::test]
    async fn rate_limited_maps_to_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "3"))
            .mount(&server)
            .await;

        let client =
            AnthropicClient::new("sk-ant-test", "claude-sonnet-4-20250514").with_base_url(server.uri());
        match client.chat(&schema_request()).await.unwrap_err() {
            LlmError::RateLimited { retry_after_secs } => assert_eq!(retry_after_secs, 3),
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }
}
