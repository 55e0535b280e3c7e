//! The LLM port implementation: structured-object generation over a chat
//! vendor, with transport retries and the full parsing fallback chain.
//!
//! Call anatomy:
//! 1. acquire a rate-limit token (shared per vendor, cancellable by drop),
//! 2. transport with its own retry budget (backoff on 5xx/network,
//!    `Retry-After` on 429, fail fast on other 4xx),
//! 3. parse the completion through the recovery chain,
//! 4. on validation failure, fresh completions up to `opts.retries`,
//! 5. final fallback: one completion against the distilled schema,
//! 6. fail with `Validation`, reporting every token consumed on the way.

use crate::json::parse_chain;
use crate::limiter::TokenBucket;
use crate::retry::Backoff;
use crate::vendor::{ChatVendor, VendorRequest, VendorResponse};
use async_trait::async_trait;
use scour_core::{
    ChatMessage, Generated, GenerateOptions, LlmError, LlmFailure, LlmPort, SchemaSpec, TokenUsage,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// [`LlmPort`] implementation wrapping a [`ChatVendor`].
pub struct StructuredClient {
    vendor: Arc<dyn ChatVendor>,
    backoff: Backoff,
    limiter: Option<Arc<TokenBucket>>,
}

impl StructuredClient {
    pub fn new(vendor: Arc<dyn ChatVendor>) -> Self {
        Self { vendor, backoff: Backoff::default(), limiter: None }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Attach a shared per-vendor rate-limit bucket.
    pub fn with_limiter(mut self, limiter: Arc<TokenBucket>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// One transport round: rate limit, per-call timeout, retry budget.
    async fn transport(
        &self,
        request: &VendorRequest,
        timeout: Duration,
        usage: &mut TokenUsage,
    ) -> Result<VendorResponse, LlmError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            if let Some(limiter) = &self.limiter {
                limiter.acquire().await;
            }

            let outcome = tokio::time::timeout(timeout, self.vendor.chat(request)).await;
            let error = match outcome {
                // Per-call deadline: a timeout is not retried.
                Err(_) => return Err(LlmError::Timeout(format!("{}s", timeout.as_secs()))),
                Ok(Ok(response)) => {
                    usage.add(response.usage);
                    return Ok(response);
                }
                Ok(Err(e)) => e,
            };

            if !error.is_retryable() || self.backoff.exhausted(attempt) {
                return Err(error);
            }

            let delay = match &error {
                LlmError::RateLimited { retry_after_secs } => Duration::from_secs(*retry_after_secs),
                _ => self.backoff.delay(attempt),
            };
            warn!(
                vendor = self.vendor.name(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "transport error, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }

    fn vendor_request(
        &self,
        schema: &SchemaSpec,
        schema_json: &Value,
        system: &str,
        messages: &[ChatMessage],
        opts: &GenerateOptions,
    ) -> VendorRequest {
        VendorRequest {
            system: system.to_string(),
            messages: messages.to_vec(),
            schema_name: Some(schema.id.replace([':', '/'], "_")),
            schema: Some(schema_json.clone()),
            temperature: opts.temperature,
            max_tokens: opts.max_tokens,
        }
    }
}

#[async_trait]
impl LlmPort for StructuredClient {
    fn name(&self) -> &str {
        self.vendor.name()
    }

    async fn generate(
        &self,
        schema: &SchemaSpec,
        system: &str,
        messages: &[ChatMessage],
        opts: &GenerateOptions,
    ) -> Result<Generated, LlmFailure> {
        let mut usage = TokenUsage::default();
        let request = self.vendor_request(schema, &schema.json, system, messages, opts);

        // Fresh completions until one parses and validates.
        for attempt in 0..=opts.retries {
            let response = match self.transport(&request, opts.timeout, &mut usage).await {
                Ok(r) => r,
                Err(e) => return Err(LlmFailure::new(e, usage)),
            };
            match parse_chain(&response.text) {
                Some(value) if validates(&schema.json, &value) => {
                    return Ok(Generated { value, usage });
                }
                Some(_) => {
                    debug!(schema = %schema.id, attempt, "completion parsed but failed schema validation")
                }
                None => debug!(schema = %schema.id, attempt, "completion did not parse as JSON"),
            }
        }

        // Last resort: the distilled (flattened) schema.
        if let Some(distilled) = &schema.distilled {
            debug!(schema = %schema.id, "falling back to distilled schema");
            let request = self.vendor_request(schema, distilled, system, messages, opts);
            match self.transport(&request, opts.timeout, &mut usage).await {
                Ok(response) => {
                    if let Some(value) = parse_chain(&response.text) {
                        if validates(distilled, &value) {
                            return Ok(Generated { value, usage });
                        }
                    }
                }
                Err(e) => return Err(LlmFailure::new(e, usage)),
            }
        }

        Err(LlmFailure::new(
            LlmError::Validation(format!(
                "no parseable object for schema '{}' after all fallbacks",
                schema.id
            )),
            usage,
        ))
    }
}

/// Shallow structural validation — enough to reject the wrong shape
/// without reimplementing a JSON Schema engine. Checks type, required
/// keys, `const`/`enum` constraints, and recurses into `oneOf`.
pub fn validates(schema: &Value, value: &Value) -> bool {
    if let Some(variants) = schema.get("oneOf").and_then(Value::as_array) {
        return variants.iter().any(|variant| validates(variant, value));
    }

    if let Some(expected) = schema.get("const") {
        return expected == value;
    }
    if let Some(options) = schema.get("enum").and_then(Value::as_array) {
        return options.contains(value);
    }

    match schema.get("type").and_then(Value::as_str) {
        Some("object") => {
            let Some(map) = value.as_object() else { return false };
            if let Some(required) = schema.get("required").and_then(Value::as_array) {
                for key in required.iter().filter_map(Value::as_str) {
                    if !map.contains_key(key) {
                        return false;
                    }
                }
            }
            if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
                for (key, subschema) in properties {
                    if let Some(subvalue) = map.get(key) {
                        if !validates(subschema, subvalue) {
                            return false;
                        }
                    }
                }
            }
            true
        }
        Some("array") => {
            let Some(items) = value.as_array() else { return false };
            if let Some(min) = schema.get("minItems").and_then(Value::as_u64) {
                if (items.len() as u64) < min {
                    return false;
                }
            }
            if let Some(item_schema) = schema.get("items") {
                items.iter().all(|item| validates(item_schema, item))
            } else {
                true
            }
        }
        Some("string") => value.is_string(),
        Some("boolean") => value.is_boolean(),
        Some("number") | Some("integer") => value.is_number(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Vendor returning scripted text replies or errors.
    struct ScriptedVendor {
        replies: Mutex<Vec<Result<String, LlmError>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedVendor {
        fn new(replies: Vec<Result<String, LlmError>>) -> Self {
            Self { replies: Mutex::new(replies), calls: Mutex::new(0) }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl ChatVendor for ScriptedVendor {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn chat(&self, _request: &VendorRequest) -> Result<VendorResponse, LlmError> {
            *self.calls.lock().unwrap() += 1;
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                return Err(LlmError::ApiError { status_code: 400, message: "exhausted".into() });
            }
            replies
                .remove(0)
                .map(|text| VendorResponse { text, usage: TokenUsage::new(10, 5) })
        }
    }

    fn action_schema() -> SchemaSpec {
        SchemaSpec::new(
            "action",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "action": { "type": "string" },
                    "think": { "type": "string" }
                },
                "required": ["action", "think"]
            }),
        )
        .with_distilled(serde_json::json!({
            "type": "object",
            "properties": {
                "action": { "type": "string" },
                "think": { "type": "string" }
            },
            "required": ["action"]
        }))
    }

    fn fast_backoff() -> Backoff {
        Backoff { base_ms: 1, multiplier: 1.0, jitter: 0.0, max_attempts: 3 }
    }

    #[tokio::test]
    async fn clean_reply_passes_first_time() {
        let vendor = Arc::new(ScriptedVendor::new(vec![Ok(
            r#"{"action": "answer", "think": "easy"}"#.into()
        )]));
        let client = StructuredClient::new(vendor.clone());
        let generated = client
            .generate(&action_schema(), "sys", &[ChatMessage::user("q")], &GenerateOptions::default())
            .await
            .unwrap();
        assert_eq!(generated.value["action"], "answer");
        assert_eq!(generated.usage.total(), 15);
        assert_eq!(vendor.calls(), 1);
    }

    #[tokio::test]
    async fn prose_wrapped_reply_recovered() {
        let vendor = Arc::new(ScriptedVendor::new(vec![Ok(
            "Sure! Here you go:\n```json\n{\"action\": \"search\", \"think\": \"find it\"}\n```".into(),
        )]));
        let client = StructuredClient::new(vendor);
        let generated = client
            .generate(&action_schema(), "sys", &[ChatMessage::user("q")], &GenerateOptions::default())
            .await
            .unwrap();
        assert_eq!(generated.value["action"], "search");
    }

    #[tokio::test]
    async fn invalid_shape_retries_then_distills() {
        // Two completions fail validation (missing `think`), then the
        // distilled call succeeds with its laxer required set.
        let vendor = Arc::new(ScriptedVendor::new(vec![
            Ok(r#"{"wrong": true}"#.into()),
            Ok(r#"{"wrong": true}"#.into()),
            Ok(r#"{"wrong": true}"#.into()),
            Ok(r#"{"action": "answer"}"#.into()),
        ]));
        let client = StructuredClient::new(vendor.clone());
        let generated = client
            .generate(&action_schema(), "sys", &[ChatMessage::user("q")], &GenerateOptions::default())
            .await
            .unwrap();
        assert_eq!(generated.value["action"], "answer");
        // retries=2 → 3 full-schema attempts, then 1 distilled.
        assert_eq!(vendor.calls(), 4);
        // Usage accumulated across every attempt.
        assert_eq!(generated.usage.total(), 60);
    }

    #[tokio::test]
    async fn total_garbage_fails_with_validation_and_usage() {
        let vendor = Arc::new(ScriptedVendor::new(vec![
            Ok("not json".into()),
            Ok("still not json".into()),
            Ok("nope".into()),
            Ok("garbage to the end".into()),
        ]));
        let client = StructuredClient::new(vendor);
        let failure = client
            .generate(&action_schema(), "sys", &[ChatMessage::user("q")], &GenerateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(failure.error, LlmError::Validation(_)));
        assert_eq!(failure.usage.total(), 60);
    }

    #[tokio::test]
    async fn transport_retries_on_5xx_then_succeeds() {
        let vendor = Arc::new(ScriptedVendor::new(vec![
            Err(LlmError::ApiError { status_code: 503, message: "overloaded".into() }),
            Ok(r#"{"action": "answer", "think": "ok"}"#.into()),
        ]));
        let client = StructuredClient::new(vendor.clone()).with_backoff(fast_backoff());
        let generated = client
            .generate(&action_schema(), "sys", &[ChatMessage::user("q")], &GenerateOptions::default())
            .await
            .unwrap();
        assert_eq!(generated.value["think"], "ok");
        assert_eq!(vendor.calls(), 2);
    }

    #[tokio::test]
    async fn client_4xx_fails_without_retry() {
        let vendor = Arc::new(ScriptedVendor::new(vec![Err(LlmError::ApiError {
            status_code: 400,
            message: "bad request".into(),
        })]));
        let client = StructuredClient::new(vendor.clone()).with_backoff(fast_backoff());
        let failure = client
            .generate(&action_schema(), "sys", &[ChatMessage::user("q")], &GenerateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(failure.error, LlmError::ApiError { status_code: 400, .. }));
        assert_eq!(vendor.calls(), 1);
    }

    #[test]
    fn validation_checks_oneof_variants() {
        let schema = serde_json::json!({
            "oneOf": [
                { "type": "object", "properties": { "action": { "const": "search" } }, "required": ["action", "queries"] },
                { "type": "object", "properties": { "action": { "const": "answer" } }, "required": ["action", "answer"] }
            ]
        });
        assert!(validates(&schema, &serde_json::json!({"action": "answer", "answer": "4"})));
        assert!(!validates(&schema, &serde_json::json!({"action": "answer"})));
        assert!(!validates(&schema, &serde_json::json!({"action": "dance", "answer": "4"})));
    }

    #[test]
    fn validation_checks_array_items() {
        let schema = serde_json::json!({
            "type": "array", "items": { "type": "string" }, "minItems": 1
        });
        assert!(validates(&schema, &serde_json::json!(["a"])));
        assert!(!validates(&schema, &serde_json::json!([])));
        assert!(!validates(&schema, &serde_json::json!([1])));
    }
}
