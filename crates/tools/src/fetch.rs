//! Page fetcher — the [`FetchPort`] implementation.
//!
//! GETs a URL with a browser-ish User-Agent, follows redirects, sniffs
//! the content type, extracts readable text from HTML, and truncates to
//! the caller's byte budget.

use crate::html;
use async_trait::async_trait;
use scour_core::{FetchError, FetchOptions, FetchPort, FetchedPage};
use tracing::{debug, warn};

const USER_AGENT: &str = "Mozilla/5.0 (compatible; scour/0.1; +https://github.com/scour)";

/// Reqwest-backed page fetcher.
pub struct PageFetcher {
    client: reqwest::Client,
}

impl PageFetcher {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .expect("Failed to create HTTP client");
        Self { client }
    }
}

impl Default for PageFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FetchPort for PageFetcher {
    async fn fetch(&self, url: &str, opts: &FetchOptions) -> Result<FetchedPage, FetchError> {
        url::Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{url}: {e}")))?;

        debug!(%url, "fetching page");
        let response = self
            .client
            .get(url)
            .timeout(opts.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout(url.to_string())
                } else {
                    FetchError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status != 200 {
            warn!(%url, status, "fetch returned non-200");
            return Err(FetchError::Http { status, url: url.to_string() });
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("text/html")
            .to_lowercase();
        let is_html = content_type.contains("html");
        let is_text = content_type.starts_with("text/") || content_type.contains("json");
        if !is_html && !is_text {
            return Err(FetchError::UnsupportedContent(content_type));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let (content_text, title, published_at) = if is_html {
            (
                html::strip_html(&body, opts.with_images),
                html::extract_title(&body),
                html::extract_published(&body),
            )
        } else {
            (body, None, None)
        };

        Ok(FetchedPage {
            content_text: truncate_bytes(&content_text, opts.max_bytes),
            title,
            published_at,
            final_url,
        })
    }
}

/// Truncate at a char boundary at or below `max` bytes.
fn truncate_bytes(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn opts() -> FetchOptions {
        FetchOptions::default()
    }

    #[tokio::test]
    async fn extracts_text_title_and_date() {
        let server = MockServer::start().await;
        let page = r#"<html><head>
            <title>The Rust Book</title>
            <meta property="article:published_time" content="2024-01-15">
            </head><body><p>by Steve Klabnik and Carol Nichols</p></body></html>"#;
        Mock::given(method("GET"))
            .and(path("/book"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(page, "text/html; charset=utf-8"),
            )
            .mount(&server)
            .await;

        let fetcher = PageFetcher::new();
        let fetched = fetcher.fetch(&format!("{}/book", server.uri()), &opts()).await.unwrap();
        assert!(fetched.content_text.contains("Steve Klabnik and Carol Nichols"));
        assert_eq!(fetched.title.as_deref(), Some("The Rust Book"));
        assert_eq!(fetched.published_at.as_deref(), Some("2024-01-15"));
        assert!(fetched.final_url.ends_with("/book"));
    }

    #[tokio::test]
    async fn non_200_is_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = PageFetcher::new();
        let err = fetcher.fetch(&format!("{}/gone", server.uri()), &opts()).await.unwrap_err();
        assert!(matches!(err, FetchError::Http { status: 404, .. }));
    }

    #[tokio::test]
    async fn binary_content_is_unsupported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/octet-stream")
                    .set_body_bytes(vec![0u8; 16]),
            )
            .mount(&server)
            .await;

        let fetcher = PageFetcher::new();
        let err = fetcher.fetch(&format!("{}/blob", server.uri()), &opts()).await.unwrap_err();
        assert!(matches!(err, FetchError::UnsupportedContent(_)));
    }

    #[tokio::test]
    async fn truncates_to_max_bytes() {
        let server = MockServer::start().await;
        let long_body = format!("<p>{}</p>", "word ".repeat(10_000));
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_string(long_body),
            )
            .mount(&server)
            .await;

        let fetcher = PageFetcher::new();
        let mut opts = opts();
        opts.max_bytes = 100;
        let fetched = fetcher.fetch(&format!("{}/long", server.uri()), &opts).await.unwrap();
        assert!(fetched.content_text.len() <= 100);
    }

    #[tokio::test]
    async fn invalid_url_rejected_before_network() {
        let fetcher = PageFetcher::new();
        let err = fetcher.fetch("not a url", &opts()).await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl(_)));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let s = "héllo wörld";
        let t = truncate_bytes(s, 3);
        assert!(t.len() <= 3);
        assert!(s.starts_with(&t));
    }
}
