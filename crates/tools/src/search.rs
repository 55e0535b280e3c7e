//! Search vendor clients behind [`SearchPort`].

use async_trait::async_trait;
use scour_core::{SearchError, SearchHit, SearchPort, SearchQuery};
use serde::Deserialize;
use tracing::{debug, warn};

const SERPER_URL: &str = "https://google.serper.dev/search";
const BRAVE_URL: &str = "https://api.search.brave.com/res/v1/web/search";

fn map_send_error(e: reqwest::Error) -> SearchError {
    if e.is_timeout() {
        SearchError::Timeout(e.to_string())
    } else {
        SearchError::Network(e.to_string())
    }
}

fn triage_status(vendor: &str, status: u16, body: String) -> SearchError {
    match status {
        429 => SearchError::RateLimited,
        401 | 403 => SearchError::NotConfigured(format!("{vendor} rejected the API key")),
        _ => {
            warn!(vendor, status, body = %body, "search API error");
            SearchError::ApiError { status_code: status, message: body }
        }
    }
}

/// Serper.dev (Google results as JSON).
pub struct SerperSearch {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl SerperSearch {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: SERPER_URL.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl SearchPort for SerperSearch {
    fn name(&self) -> &str {
        "serper"
    }

    async fn query(&self, q: &SearchQuery) -> Result<Vec<SearchHit>, SearchError> {
        let mut body = serde_json::json!({
            "q": q.query,
            "num": q.num_results,
        });
        if let Some(lang) = &q.language {
            body["hl"] = serde_json::json!(lang);
        }

        debug!(query = %q.query, "serper search");
        let response = self
            .client
            .post(&self.base_url)
            .header("X-API-KEY", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(triage_status("serper", status, body));
        }

        let api: SerperResponse = response
            .json()
            .await
            .map_err(|e| SearchError::ApiError { status_code: 200, message: e.to_string() })?;

        Ok(api
            .organic
            .into_iter()
            .map(|r| SearchHit {
                url: r.link,
                title: r.title,
                snippet: r.snippet.unwrap_or_default(),
                published_at: r.date,
                rerank_score: r.position.map(|p| 1.0 / p as f64),
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperResult>,
}

#[derive(Debug, Deserialize)]
struct SerperResult {
    title: String,
    link: String,
    #[serde(default)]
    snippet: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    position: Option<u32>,
}

/// Brave Search API.
pub struct BraveSearch {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl BraveSearch {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: BRAVE_URL.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl SearchPort for BraveSearch {
    fn name(&self) -> &str {
        "brave"
    }

    async fn query(&self, q: &SearchQuery) -> Result<Vec<SearchHit>, SearchError> {
        let mut request = self
            .client
            .get(&self.base_url)
            .header("X-Subscription-Token", &self.api_key)
            .header("Accept", "application/json")
            .query(&[("q", q.query.as_str())])
            .query(&[("count", q.num_results.to_string())]);
        if let Some(lang) = &q.language {
            request = request.query(&[("search_lang", lang.as_str())]);
        }

        debug!(query = %q.query, "brave search");
        let response = request.send().await.map_err(map_send_error)?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(triage_status("brave", status, body));
        }

        let api: BraveResponse = response
            .json()
            .await
            .map_err(|e| SearchError::ApiError { status_code: 200, message: e.to_string() })?;

        Ok(api
            .web
            .map(|w| w.results)
            .unwrap_or_default()
            .into_iter()
            .map(|r| SearchHit {
                url: r.url,
                title: r.title,
                snippet: r.description.unwrap_or_default(),
                published_at: r.page_age,
                rerank_score: None,
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: Option<BraveWeb>,
}

#[derive(Debug, Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    title: String,
    url: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    page_age: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn serper_maps_organic_results() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("x-api-key", "serper-key"))
            .and(body_partial_json(serde_json::json!({"q": "rust book author"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "organic": [
                    {
                        "title": "The Rust Programming Language",
                        "link": "https://doc.rust-lang.org/book/",
                        "snippet": "by Steve Klabnik and Carol Nichols",
                        "position": 1
                    },
                    {
                        "title": "No Starch Press",
                        "link": "https://nostarch.com/rust-programming-language-2nd-edition",
                        "position": 2
                    }
                ]
            })))
            .mount(&server)
            .await;

        let search = SerperSearch::new("serper-key").with_base_url(server.uri());
        let hits = search.query(&SearchQuery::new("rust book author")).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].url, "https://doc.rust-lang.org/book/");
        assert_eq!(hits[0].rerank_score, Some(1.0));
        assert!(hits[1].snippet.is_empty());
    }

    #[tokio::test]
    async fn serper_429_is_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let search = SerperSearch::new("serper-key").with_base_url(server.uri());
        assert!(matches!(
            search.query(&SearchQuery::new("q")).await.unwrap_err(),
            SearchError::RateLimited
        ));
    }

    #[tokio::test]
    async fn brave_maps_web_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("x-subscription-token", "brave-key"))
            .and(query_param("q", "rust book author"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "web": {
                    "results": [{
                        "title": "The Rust Book",
                        "url": "https://doc.rust-lang.org/book/",
                        "description": "official book",
                        "page_age": "2023-05-01"
                    }]
                }
            })))
            .mount(&server)
            .await;

        let search = BraveSearch::new("brave-key").with_base_url(server.uri());
        let hits = search.query(&SearchQuery::new("rust book author")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].published_at.as_deref(), Some("2023-05-01"));
    }

    #[tokio::test]
    async fn brave_empty_web_section_is_empty_result() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let search = BraveSearch::new("brave-key").with_base_url(server.uri());
        let hits = search.query(&SearchQuery::new("q")).await.unwrap();
        assert!(hits.is_empty());
    }
}
