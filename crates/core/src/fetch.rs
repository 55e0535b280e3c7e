//! Fetch port — page retrieval and text extraction.

use crate::error::FetchError;
use async_trait::async_trait;
use std::time::Duration;

/// Per-fetch options.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub timeout: Duration,
    /// Extracted text is truncated to this many bytes.
    pub max_bytes: usize,
    /// Keep image alt text in the extraction.
    pub with_images: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_bytes: 64 * 1024,
            with_images: false,
        }
    }
}

/// A fetched and extracted page.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// HTML-stripped, whitespace-collapsed, truncated text.
    pub content_text: String,
    pub title: Option<String>,
    pub published_at: Option<String>,
    /// URL after redirects.
    pub final_url: String,
}

/// The fetch port implemented by the page fetcher.
#[async_trait]
pub trait FetchPort: Send + Sync {
    async fn fetch(&self, url: &str, opts: &FetchOptions) -> std::result::Result<FetchedPage, FetchError>;
}
