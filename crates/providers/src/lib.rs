//! # Scour Providers
//!
//! LLM vendor clients and the [`scour_core::LlmPort`] implementation.
//!
//! The split mirrors the fallback chain: a [`vendor::ChatVendor`] speaks
//! one wire protocol (OpenAI-compatible or Anthropic-native) and returns
//! raw text plus token usage; [`StructuredClient`] owns everything above
//! that — transport retries with backoff, per-vendor rate limiting, and
//! the structured-output fallback chain (vendor-native JSON schema →
//! manual extraction → tolerant repair → lenient dialect → distilled
//! schema → failure).

pub mod anthropic;
pub mod json;
pub mod limiter;
pub mod openai_compat;
pub mod retry;
pub mod structured;
pub mod vendor;

pub use anthropic::AnthropicClient;
pub use limiter::TokenBucket;
pub use openai_compat::OpenAiCompatClient;
pub use retry::Backoff;
pub use structured::StructuredClient;
pub use vendor::{ChatVendor, VendorRequest, VendorResponse};
