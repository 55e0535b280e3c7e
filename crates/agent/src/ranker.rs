//! URL ranker — deduplicates, scores, and orders candidate URLs.
//!
//! Score = `freq·w1 + host_boost·w2 + path_boost·w3 + rerank·w4 −
//! bad_host_penalty`. Hostname allow/boost/penalty lists come from the
//! request. Keys are canonical URLs.

use scour_core::{FetchedPage, SearchHit, UrlRecord, VisitState};
use std::collections::HashMap;
use tracing::debug;
use url::Url;

/// Configurable scoring weights.
#[derive(Debug, Clone)]
pub struct RankerWeights {
    pub freq: f64,
    pub host: f64,
    pub path: f64,
    pub rerank: f64,
    pub bad_penalty: f64,
}

impl Default for RankerWeights {
    fn default() -> Self {
        Self { freq: 1.0, host: 2.0, path: 0.5, rerank: 3.0, bad_penalty: 5.0 }
    }
}

/// Hostname gating and bias lists from the request.
#[derive(Debug, Clone, Default)]
pub struct HostRules {
    pub boost: Vec<String>,
    pub bad: Vec<String>,
    /// If non-empty, hostnames outside this list are dropped entirely.
    pub only: Vec<String>,
}

/// Per-session URL state and scoring.
#[derive(Debug)]
pub struct UrlRanker {
    records: HashMap<String, UrlRecord>,
    /// Insertion order of keys, to keep iteration deterministic.
    order: Vec<String>,
    freq: HashMap<String, u32>,
    /// Consecutive fetch failures per host; two in a row demotes the host.
    host_failures: HashMap<String, u32>,
    demoted_hosts: Vec<String>,
    weights: RankerWeights,
    rules: HostRules,
    /// URLs handed to visit, in order. Includes failed attempts.
    attempted: Vec<String>,
}

impl UrlRanker {
    pub fn new(weights: RankerWeights, rules: HostRules) -> Self {
        Self {
            records: HashMap::new(),
            order: Vec::new(),
            freq: HashMap::new(),
            host_failures: HashMap::new(),
            demoted_hosts: Vec::new(),
            weights,
            rules,
            attempted: Vec::new(),
        }
    }

    /// Canonicalize a URL: strip the fragment, lowercase the host, drop
    /// common tracking query parameters, normalize the trailing slash.
    /// Returns `None` for unparseable or non-http(s) URLs.
    pub fn canonicalize(raw: &str) -> Option<String> {
        let mut url = Url::parse(raw.trim()).ok()?;
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }
        url.set_fragment(None);
        let host = url.host_str()?.to_lowercase();
        url.set_host(Some(&host)).ok()?;

        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| !is_tracking_param(k))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        if kept.is_empty() {
            url.set_query(None);
        } else {
            let mut qs = url.query_pairs_mut();
            qs.clear();
            for (k, v) in &kept {
                qs.append_pair(k, v);
            }
            drop(qs);
        }

        let mut s = url.to_string();
        // Root path only: `https://host/` → `https://host`
        if url.path() == "/" && url.query().is_none() {
            s = s.trim_end_matches('/').to_string();
        }
        Some(s)
    }

    fn hostname(canonical: &str) -> Option<String> {
        Url::parse(canonical).ok()?.host_str().map(str::to_string)
    }

    /// Merge search hits into the record set. New URLs start `Unseen`;
    /// repeated sightings bump frequency. Hits outside `only_hostnames`
    /// (when set) are dropped.
    pub fn merge(&mut self, hits: &[SearchHit], source_step: u32) -> usize {
        let mut added = 0;
        for hit in hits {
            let Some(canonical) = Self::canonicalize(&hit.url) else {
                continue;
            };
            let Some(host) = Self::hostname(&canonical) else {
                continue;
            };
            if !self.rules.only.is_empty() && !host_matches(&host, &self.rules.only) {
                continue;
            }

            *self.freq.entry(canonical.clone()).or_insert(0) += 1;

            match self.records.get_mut(&canonical) {
                Some(existing) => {
                    if existing.title.is_empty() && !hit.title.is_empty() {
                        existing.title = hit.title.clone();
                    }
                    if let Some(score) = hit.rerank_score {
                        existing.rerank_score = Some(score);
                    }
                }
                None => {
                    let mut rec = UrlRecord::new(&canonical, &hit.title, &hit.snippet, source_step);
                    rec.rerank_score = hit.rerank_score;
                    rec.published_at = hit.published_at.clone();
                    self.records.insert(canonical.clone(), rec);
                    self.order.push(canonical);
                    added += 1;
                }
            }
        }
        debug!(added, total = self.records.len(), "URL ranker merged search hits");
        added
    }

    fn score(&self, rec: &UrlRecord) -> f64 {
        let host = Self::hostname(&rec.url).unwrap_or_default();
        let freq = *self.freq.get(&rec.url).unwrap_or(&1) as f64;

        let host_boost = if host_matches(&host, &self.rules.boost) { 1.0 } else { 0.0 };
        // Shallow paths read as more canonical sources.
        let depth = Url::parse(&rec.url)
            .map(|u| u.path().matches('/').count())
            .unwrap_or(1);
        let path_boost = 1.0 / depth.max(1) as f64;
        let rerank = rec.rerank_score.unwrap_or(0.0);
        let bad = host_matches(&host, &self.rules.bad) || self.demoted_hosts.contains(&host);
        let penalty = if bad { self.weights.bad_penalty } else { 0.0 };

        freq * self.weights.freq
            + host_boost * self.weights.host
            + path_boost * self.weights.path
            + rerank * self.weights.rerank
            - penalty
            + rec.boost
    }

    /// The top-k unvisited URLs by score, ties broken by insertion order.
    pub fn sort_select(&self, k: usize) -> Vec<&UrlRecord> {
        let mut candidates: Vec<(usize, &UrlRecord)> = self
            .order
            .iter()
            .enumerate()
            .filter_map(|(i, key)| {
                let rec = self.records.get(key)?;
                rec.is_unvisited().then_some((i, rec))
            })
            .collect();
        candidates.sort_by(|(ia, a), (ib, b)| {
            self.score(b)
                .partial_cmp(&self.score(a))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(ia.cmp(ib))
        });
        candidates.into_iter().take(k).map(|(_, rec)| rec).collect()
    }

    pub fn get(&self, raw_or_canonical: &str) -> Option<&UrlRecord> {
        let key = Self::canonicalize(raw_or_canonical)?;
        self.records.get(&key)
    }

    /// Record that a visit attempt is starting.
    pub fn mark_queued(&mut self, raw: &str) {
        if let Some(key) = Self::canonicalize(raw) {
            self.attempted.push(key.clone());
            let rec = self
                .records
                .entry(key.clone())
                .or_insert_with(|| UrlRecord::new(&key, "", "", 0));
            if rec.is_unvisited() {
                rec.state = VisitState::Queued;
            }
            if !self.order.contains(&key) {
                self.order.push(key);
            }
        }
    }

    /// Record a successful visit with extracted content.
    pub fn mark_visited(&mut self, raw: &str, page: &FetchedPage) {
        let Some(key) = Self::canonicalize(raw) else { return };
        if let Some(host) = Self::hostname(&key) {
            self.host_failures.remove(&host);
        }
        if let Some(rec) = self.records.get_mut(&key) {
            rec.state = VisitState::Visited;
            rec.content = Some(page.content_text.clone());
            if let Some(title) = &page.title {
                if rec.title.is_empty() {
                    rec.title = title.clone();
                }
            }
            if rec.published_at.is_none() {
                rec.published_at = page.published_at.clone();
            }
            rec.last_error = None;
        }
    }

    /// Record a failed visit. A host's second consecutive failure demotes
    /// every remaining URL on that host.
    pub fn mark_failed(&mut self, raw: &str, error: &str) {
        let Some(key) = Self::canonicalize(raw) else { return };
        if let Some(rec) = self.records.get_mut(&key) {
            rec.state = VisitState::Failed;
            rec.last_error = Some(error.to_string());
        }
        if let Some(host) = Self::hostname(&key) {
            let failures = self.host_failures.entry(host.clone()).or_insert(0);
            *failures += 1;
            if *failures >= 2 && !self.demoted_hosts.contains(&host) {
                debug!(%host, "demoting host after repeated fetch failures");
                self.demoted_hosts.push(host);
            }
        }
    }

    /// URLs handed to visit, in attempt order, deduplicated.
    pub fn visited_urls(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.attempted
            .iter()
            .filter(|u| seen.insert(u.as_str()))
            .cloned()
            .collect()
    }

    /// URLs whose content was successfully read.
    pub fn read_urls(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|key| {
                self.records
                    .get(*key)
                    .is_some_and(|r| r.state == VisitState::Visited)
            })
            .cloned()
            .collect()
    }

    /// Every URL the session knows about, in first-seen order.
    pub fn all_urls(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || matches!(key, "fbclid" | "gclid" | "ref" | "mc_cid" | "mc_eid")
}

fn host_matches(host: &str, list: &[String]) -> bool {
    list.iter().any(|h| {
        let h = h.to_lowercase();
        host == h || host.ends_with(&format!(".{h}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(url: &str) -> SearchHit {
        SearchHit {
            url: url.into(),
            title: "title".into(),
            snippet: "snippet".into(),
            published_at: None,
            rerank_score: None,
        }
    }

    fn page(text: &str) -> FetchedPage {
        FetchedPage {
            content_text: text.into(),
            title: Some("Page".into()),
            published_at: None,
            final_url: String::new(),
        }
    }

    #[test]
    fn canonicalize_strips_fragment_and_tracking() {
        let c = UrlRanker::canonicalize(
            "HTTPS://Example.COM/Page?utm_source=x&id=7&fbclid=abc#section",
        )
        .unwrap();
        assert_eq!(c, "https://example.com/Page?id=7");
    }

    #[test]
    fn canonicalize_normalizes_root_slash() {
        assert_eq!(
            UrlRanker::canonicalize("https://example.com/").unwrap(),
            UrlRanker::canonicalize("https://example.com").unwrap(),
        );
    }

    #[test]
    fn canonicalize_rejects_non_http() {
        assert!(UrlRanker::canonicalize("ftp://example.com/x").is_none());
        assert!(UrlRanker::canonicalize("not a url").is_none());
    }

    #[test]
    fn merge_deduplicates_by_canonical_form() {
        let mut ranker = UrlRanker::new(RankerWeights::default(), HostRules::default());
        let added = ranker.merge(
            &[hit("https://example.com/a#x"), hit("https://EXAMPLE.com/a")],
            1,
        );
        assert_eq!(added, 1);
        assert_eq!(ranker.len(), 1);
    }

    #[test]
    fn only_hostnames_gate() {
        let rules = HostRules { only: vec!["rust-lang.org".into()], ..Default::default() };
        let mut ranker = UrlRanker::new(RankerWeights::default(), rules);
        ranker.merge(
            &[hit("https://doc.rust-lang.org/book/"), hit("https://example.com/rust")],
            1,
        );
        assert_eq!(ranker.len(), 1);
        assert!(ranker.get("https://doc.rust-lang.org/book/").is_some());
    }

    #[test]
    fn frequency_and_boost_order_selection() {
        let rules = HostRules { boost: vec!["rust-lang.org".into()], ..Default::default() };
        let mut ranker = UrlRanker::new(RankerWeights::default(), rules);
        ranker.merge(&[hit("https://example.com/popular")], 1);
        ranker.merge(&[hit("https://example.com/popular")], 2);
        ranker.merge(&[hit("https://doc.rust-lang.org/book/")], 2);
        let top = ranker.sort_select(2);
        assert_eq!(top.len(), 2);
        // Boosted host (w=2.0) outranks the twice-seen URL (freq 2 vs 1).
        assert_eq!(top[0].url, "https://doc.rust-lang.org/book/");
    }

    #[test]
    fn bad_hostnames_sink() {
        let rules = HostRules { bad: vec!["spam.example".into()], ..Default::default() };
        let mut ranker = UrlRanker::new(RankerWeights::default(), rules);
        ranker.merge(&[hit("https://spam.example/a"), hit("https://ok.example/b")], 1);
        let top = ranker.sort_select(2);
        assert_eq!(top[0].url, "https://ok.example/b");
    }

    #[test]
    fn visited_urls_excluded_from_selection() {
        let mut ranker = UrlRanker::new(RankerWeights::default(), HostRules::default());
        ranker.merge(&[hit("https://a.example/1"), hit("https://b.example/2")], 1);
        ranker.mark_queued("https://a.example/1");
        ranker.mark_visited("https://a.example/1", &page("content"));
        let top = ranker.sort_select(5);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].url, "https://b.example/2");
    }

    #[test]
    fn host_demotion_after_two_failures() {
        let mut ranker = UrlRanker::new(RankerWeights::default(), HostRules::default());
        ranker.merge(
            &[
                hit("https://flaky.example/1"),
                hit("https://flaky.example/2"),
                hit("https://flaky.example/3"),
                hit("https://solid.example/1"),
            ],
            1,
        );
        ranker.mark_failed("https://flaky.example/1", "timeout");
        ranker.mark_failed("https://flaky.example/2", "timeout");
        let top = ranker.sort_select(4);
        assert_eq!(top[0].url, "https://solid.example/1");
    }

    #[test]
    fn url_inventories() {
        let mut ranker = UrlRanker::new(RankerWeights::default(), HostRules::default());
        ranker.merge(&[hit("https://a.example/1"), hit("https://b.example/2")], 1);
        ranker.mark_queued("https://a.example/1");
        ranker.mark_visited("https://a.example/1", &page("text"));
        ranker.mark_queued("https://b.example/2");
        ranker.mark_failed("https://b.example/2", "500");

        assert_eq!(ranker.visited_urls().len(), 2);
        assert_eq!(ranker.read_urls(), vec!["https://a.example/1".to_string()]);
        assert_eq!(ranker.all_urls().len(), 2);
    }

    #[test]
    fn visit_content_recorded() {
        let mut ranker = UrlRanker::new(RankerWeights::default(), HostRules::default());
        ranker.merge(&[hit("https://a.example/1")], 1);
        ranker.mark_queued("https://a.example/1");
        ranker.mark_visited("https://a.example/1", &page("extracted text"));
        let rec = ranker.get("https://a.example/1").unwrap();
        assert_eq!(rec.state, VisitState::Visited);
        assert_eq!(rec.content.as_deref(), Some("extracted text"));
    }
}
