//! The internal vendor seam: one wire protocol per implementation.
//!
//! Vendors return raw completion text and usage; parsing, validation, and
//! retries live in [`crate::StructuredClient`].

use async_trait::async_trait;
use scour_core::{ChatMessage, LlmError, TokenUsage};

/// One chat completion request, already flattened to vendor-agnostic form.
#[derive(Debug, Clone)]
pub struct VendorRequest {
    pub system: String,
    pub messages: Vec<ChatMessage>,
    /// When set, the vendor should use native structured output for this
    /// schema. Vendors that cannot will be asked for plain JSON in text.
    pub schema_name: Option<String>,
    pub schema: Option<serde_json::Value>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl VendorRequest {
    pub fn text_only(system: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            system: system.into(),
            messages,
            schema_name: None,
            schema: None,
            temperature: 0.7,
            max_tokens: None,
        }
    }
}

/// The raw completion.
#[derive(Debug, Clone)]
pub struct VendorResponse {
    pub text: String,
    pub usage: TokenUsage,
}

/// A chat vendor. Implementations: OpenAI-compatible, Anthropic-native.
#[async_trait]
pub trait ChatVendor: Send + Sync {
    fn name(&self) -> &str;

    async fn chat(&self, request: &VendorRequest) -> Result<VendorResponse, LlmError>;
}
