//! LLM port — structured-object generation with schema fallback.
//!
//! The controller only ever asks the LLM for an object matching a schema.
//! Implementations own the fallback chain (vendor-native JSON schema →
//! manual extraction → repair → lenient dialect → distilled schema) and
//! transport retries; the port surface stays a single call.

use crate::error::LlmError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A JSON schema handed to the LLM port.
///
/// `distilled` is an optional flattened variant (nested fields collapsed
/// into primitive keys) used as the last parsing fallback before failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaSpec {
    /// Stable identifier ("action", "evaluator:strict", "query-rewriter", ...).
    pub id: String,
    pub json: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distilled: Option<serde_json::Value>,
}

impl SchemaSpec {
    pub fn new(id: impl Into<String>, json: serde_json::Value) -> Self {
        Self { id: id.into(), json, distilled: None }
    }

    pub fn with_distilled(mut self, distilled: serde_json::Value) -> Self {
        self.distilled = Some(distilled);
        self
    }
}

/// Role of a chat message sent to the LLM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One message in the prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

/// Per-call generation options.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Fresh-completion retries on parse/validation failure (transport
    /// retries are budgeted separately inside the port).
    pub retries: u32,
    pub timeout: Duration,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            retries: 2,
            timeout: Duration::from_secs(30),
            temperature: 0.7,
            max_tokens: None,
        }
    }
}

/// Token usage for one port call. Reported even when the call fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt: u64,
    pub completion: u64,
}

impl TokenUsage {
    pub fn new(prompt: u64, completion: u64) -> Self {
        Self { prompt, completion }
    }

    pub fn total(&self) -> u64 {
        self.prompt + self.completion
    }

    pub fn add(&mut self, other: TokenUsage) {
        self.prompt += other.prompt;
        self.completion += other.completion;
    }
}

/// A successful structured generation.
#[derive(Debug, Clone)]
pub struct Generated {
    pub value: serde_json::Value,
    pub usage: TokenUsage,
}

/// A failed generation. Usage covers everything consumed before failing,
/// including failed parse attempts and the distilled retry.
#[derive(Debug, Clone)]
pub struct LlmFailure {
    pub error: LlmError,
    pub usage: TokenUsage,
}

impl LlmFailure {
    pub fn new(error: LlmError, usage: TokenUsage) -> Self {
        Self { error, usage }
    }
}

impl std::fmt::Display for LlmFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)
    }
}

/// The port the controller generates every structured object through.
#[async_trait]
pub trait LlmPort: Send + Sync {
    /// A human-readable name for logging ("openai", "anthropic", "scripted").
    fn name(&self) -> &str;

    /// Generate an object matching `schema`. The returned value has passed
    /// the port's validation; callers still decode it into domain types.
    async fn generate(
        &self,
        schema: &SchemaSpec,
        system: &str,
        messages: &[ChatMessage],
        opts: &GenerateOptions,
    ) -> std::result::Result<Generated, LlmFailure>;
}
