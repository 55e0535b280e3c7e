//! URL records — per-session state for every URL the agent has seen.

use serde::{Deserialize, Serialize};

/// Where a URL is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisitState {
    /// Known from search results, never selected.
    Unseen,
    /// Selected for a visit that has not completed.
    Queued,
    /// Fetched and extracted successfully.
    Visited,
    /// Fetch failed; `last_error` records why.
    Failed,
}

/// One URL the session knows about, keyed by its canonical form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlRecord {
    /// Canonicalized URL (fragment stripped, host lowercased, tracking
    /// params removed).
    pub url: String,
    pub title: String,
    pub snippet: String,
    /// The step at which this URL first appeared.
    pub source_step: u32,
    pub state: VisitState,
    /// Additive score adjustment from boost/penalty rules.
    pub boost: f64,
    /// Vendor-provided rerank score, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Extracted text for visited URLs (possibly truncated).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl UrlRecord {
    pub fn new(url: impl Into<String>, title: impl Into<String>, snippet: impl Into<String>, source_step: u32) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            snippet: snippet.into(),
            source_step,
            state: VisitState::Unseen,
            boost: 0.0,
            rerank_score: None,
            published_at: None,
            last_error: None,
            content: None,
        }
    }

    /// Whether this URL is still a candidate for visiting.
    pub fn is_unvisited(&self) -> bool {
        matches!(self.state, VisitState::Unseen | VisitState::Queued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_is_unvisited() {
        let rec = UrlRecord::new("https://example.com/a", "Example", "snippet", 3);
        assert!(rec.is_unvisited());
        assert_eq!(rec.source_step, 3);
    }

    #[test]
    fn visited_and_failed_are_not_candidates() {
        let mut rec = UrlRecord::new("https://example.com/a", "", "", 0);
        rec.state = VisitState::Visited;
        assert!(!rec.is_unvisited());
        rec.state = VisitState::Failed;
        assert!(!rec.is_unvisited());
    }
}
