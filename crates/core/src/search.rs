//! Search port — web search vendors behind a uniform call/result shape.

use crate::error::SearchError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One search invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    /// Vendor language hint (e.g. "en", "de").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub num_results: usize,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self { query: query.into(), language: None, num_results: 10 }
    }
}

/// One result row from a search vendor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f64>,
}

/// The search port implemented by vendor clients.
#[async_trait]
pub trait SearchPort: Send + Sync {
    fn name(&self) -> &str;

    async fn query(&self, q: &SearchQuery) -> std::result::Result<Vec<SearchHit>, SearchError>;
}
