//! Fetching web pages for `CRAWLED_URL` documents.

use std::time::Duration;

use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use crate::config::CrawlerConfig;
use crate::error::{CrawlError, ServiceError, ServiceResult};

use super::html::{extract_title, html_to_text};

/// A fetched page reduced to its visible text
#[derive(Debug, Clone)]
pub struct CrawledPage {
    /// URL after redirects
    pub url: String,
    pub status: u16,
    pub content_type: String,
    pub title: Option<String>,
    pub text: String,
}

/// HTTP client for crawling pages
pub struct Crawler {
    client: Client,
    max_body_bytes: u64,
}

impl Crawler {
    pub fn new(config: &CrawlerConfig) -> ServiceResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ServiceError::Config {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            max_body_bytes: config.max_body_bytes,
        })
    }

    /// Fetch a page; only HTML and plain text bodies are accepted.
    pub async fn fetch(&self, url: &str) -> ServiceResult<CrawledPage> {
        let parsed = url::Url::parse(url).map_err(|e| CrawlError::InvalidUrl {
            url: url.to_string(),
            source: e,
        })?;

        let mut response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| CrawlError::Request {
                url: url.to_string(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CrawlError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }
            .into());
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("text/html")
            .to_string();
        let mime_type: mime::Mime = content_type.parse().unwrap_or(mime::TEXT_HTML);
        let is_html = mime_type.subtype() == mime::HTML || mime_type.essence_str() == "application/xhtml+xml";
        let is_text = mime_type.type_() == mime::TEXT && mime_type.subtype() == mime::PLAIN;
        if !is_html && !is_text {
            return Err(CrawlError::UnsupportedContentType {
                url: url.to_string(),
                content_type,
            }
            .into());
        }

        if response
            .content_length()
            .is_some_and(|len| len > self.max_body_bytes)
        {
            return Err(self.too_large(url));
        }

        let final_url = response.url().to_string();
        let mut body: Vec<u8> = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| CrawlError::Request {
            url: url.to_string(),
            source: e,
        })? {
            if (body.len() + chunk.len()) as u64 > self.max_body_bytes {
                return Err(self.too_large(url));
            }
            body.extend_from_slice(&chunk);
        }
        let raw = String::from_utf8_lossy(&body);

        let (title, text) = if is_html {
            (extract_title(&raw), html_to_text(&raw))
        } else {
            (None, raw.trim().to_string())
        };

        debug!(url = %final_url, status = status.as_u16(), bytes = body.len(), "Fetched page");

        Ok(CrawledPage {
            url: final_url,
            status: status.as_u16(),
            content_type,
            title,
            text,
        })
    }

    fn too_large(&self, url: &str) -> ServiceError {
        CrawlError::BodyTooLarge {
            url: url.to_string(),
            max: self.max_body_bytes,
        }
        .into()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn crawler(max_body_bytes: u64) -> Crawler {
        Crawler::new(&CrawlerConfig {
            max_body_bytes,
            ..crate::config::ServiceConfig::default().crawler
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_html_page() {
        let base = test_server::spawn().await;
        let page = crawler(1024 * 1024)
            .fetch(&format!("{}/article", base))
            .await
            .unwrap();

        assert_eq!(page.status, 200);
        assert_eq!(page.title.as_deref(), Some("Field Notes"));
        assert_eq!(page.text, "Quarry pages are crawled.");
        assert!(page.content_type.starts_with("text/html"));
    }

    #[tokio::test]
    async fn test_fetch_plain_text() {
        let base = test_server::spawn().await;
        let page = crawler(1024)
            .fetch(&format!("{}/notes.txt", base))
            .await
            .unwrap();
        assert_eq!(page.title, None);
        assert_eq!(page.text, "plain notes");
    }

    #[tokio::test]
    async fn test_rejections() {
        let base = test_server::spawn().await;
        let crawler = crawler(1024);

        let err = crawler.fetch(&format!("{}/image.png", base)).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Crawl(CrawlError::UnsupportedContentType { .. })
        ));
        assert!(!err.is_retryable());

        let err = crawler.fetch(&format!("{}/big", base)).await.unwrap_err();
        assert!(matches!(err, ServiceError::Crawl(CrawlError::BodyTooLarge { .. })));

        let err = crawler.fetch(&format!("{}/missing", base)).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Crawl(CrawlError::Status { status: 404, .. })
        ));

        let err = crawler.fetch(&format!("{}/flaky", base)).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
