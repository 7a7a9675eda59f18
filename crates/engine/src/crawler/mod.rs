//! Blog crawler: fetch a URL and extract its main text plus page metadata.
//!
//! The pipeline only depends on this surface — fetch, extract, count words.

mod extract;

pub use extract::{extract_page, ExtractedPage};

use std::time::Duration;

/// Minimum words for extracted text to count as usable content.
pub const MIN_WORD_COUNT: i32 = 50;

/// HTTP crawler with a per-fetch timeout and a response size cap.
pub struct Crawler {
    http: reqwest::Client,
    timeout: Duration,
    max_content_bytes: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("Unsupported content type: {0}")]
    ContentType(String),

    #[error("Response too large: {got} bytes (cap {cap})")]
    TooLarge { got: usize, cap: usize },

    #[error("Content too small: {words} words (minimum {MIN_WORD_COUNT})")]
    TooSmall { words: i32 },

    #[error("Empty response body")]
    EmptyBody,
}

impl From<CrawlError> for askpage_common::AskpageError {
    fn from(e: CrawlError) -> Self {
        askpage_common::AskpageError::Crawl(e.to_string())
    }
}

impl Crawler {
    pub fn new(timeout: Duration, max_content_bytes: usize) -> Self {
        Self {
            http: reqwest::Client::new(),
            timeout,
            max_content_bytes,
        }
    }

    /// Fetch a blog URL and extract its main text and metadata.
    pub async fn fetch_blog(&self, url: &str) -> Result<ExtractedPage, CrawlError> {
        let start = std::time::Instant::now();
        let domain = askpage_common::url::domain_of(url).unwrap_or_else(|_| "unknown".into());

        let response = self
            .http
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                metrics::counter!("crawler.fetch.errors", "domain" => domain.clone()).increment(1);
                CrawlError::Http(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            metrics::counter!("crawler.fetch.errors", "domain" => domain.clone()).increment(1);
            return Err(CrawlError::Status(status.as_u16()));
        }

        if let Some(length) = response.content_length() {
            if length as usize > self.max_content_bytes {
                return Err(CrawlError::TooLarge {
                    got: length as usize,
                    cap: self.max_content_bytes,
                });
            }
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(str::to_lowercase)
            .unwrap_or_default();
        let is_text = content_type.is_empty()
            || content_type.contains("text/html")
            || content_type.contains("text/plain")
            || content_type.contains("xhtml");
        if !is_text {
            return Err(CrawlError::ContentType(content_type));
        }

        let body = response
            .text()
            .await
            .map_err(|e| CrawlError::Http(e.to_string()))?;

        if body.len() > self.max_content_bytes {
            return Err(CrawlError::TooLarge {
                got: body.len(),
                cap: self.max_content_bytes,
            });
        }
        if body.trim().is_empty() {
            return Err(CrawlError::EmptyBody);
        }

        let latency = start.elapsed().as_secs_f64();
        metrics::histogram!("crawler.fetch.latency", "domain" => domain).record(latency);

        let page = extract_page(&body);
        if page.word_count < MIN_WORD_COUNT {
            return Err(CrawlError::TooSmall {
                words: page.word_count,
            });
        }

        Ok(page)
    }
}
