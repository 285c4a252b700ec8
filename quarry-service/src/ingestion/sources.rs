//! Typed ingestion sources.
//!
//! Every unit of background work is one `IngestionSource`, serialized as tagged
//! JSON into the job row.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::db::DocumentType;
use crate::error::{ServiceError, ServiceResult};

/// Metadata captured by the browser extension alongside a page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionMetadata {
    #[serde(rename = "BrowsingSessionId")]
    pub browsing_session_id: String,
    #[serde(rename = "VisitedWebPageURL")]
    pub url: String,
    #[serde(rename = "VisitedWebPageTitle")]
    pub title: String,
    #[serde(rename = "VisitedWebPageDateWithTimeInISOString")]
    pub visited_at: String,
    #[serde(rename = "VisitedWebPageReffererURL", default)]
    pub referrer_url: Option<String>,
    #[serde(rename = "VisitedWebPageVisitDurationInMilliseconds", default)]
    pub visit_duration_ms: Option<String>,
}

/// A page captured by the browser extension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionCapture {
    pub metadata: ExtensionMetadata,
    #[serde(rename = "pageContent")]
    pub page_content: String,
}

impl ExtensionCapture {
    /// Markdown rendition: capture metadata first, then the page content.
    pub fn to_markdown(&self) -> String {
        let meta = &self.metadata;
        let mut out = format!("# {}\n\n## Metadata\n\n", meta.title);
        out.push_str(&format!("- URL: {}\n", meta.url));
        out.push_str(&format!("- Visited at: {}\n", meta.visited_at));
        if let Some(referrer) = meta.referrer_url.as_deref().filter(|r| !r.is_empty()) {
            out.push_str(&format!("- Referrer: {}\n", referrer));
        }
        if let Some(duration) = meta.visit_duration_ms.as_deref().filter(|d| !d.is_empty()) {
            out.push_str(&format!("- Visit duration (ms): {}\n", duration));
        }
        out.push_str(&format!("- Browsing session: {}\n", meta.browsing_session_id));
        out.push_str("\n## Content\n\n");
        out.push_str(self.page_content.trim());
        out
    }
}

/// One unit of content to ingest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IngestionSource {
    Extension { capture: ExtensionCapture },
    CrawledUrl { url: String },
    /// An upload staged on disk; `filename` is what the client called it
    File { staged_path: PathBuf, filename: String },
    YoutubeVideo { url: String },
}

impl IngestionSource {
    /// Parse one submitted content item for a structured document type.
    ///
    /// Only the types that arrive as JSON are accepted here; files go through
    /// the upload endpoint.
    pub fn from_submission(
        document_type: DocumentType,
        item: serde_json::Value,
    ) -> ServiceResult<Self> {
        match document_type {
            DocumentType::Extension => {
                let capture: ExtensionCapture =
                    serde_json::from_value(item).map_err(|e| ServiceError::InvalidRequest {
                        message: format!("Invalid extension capture: {}", e),
                    })?;
                Ok(IngestionSource::Extension { capture })
            }
            DocumentType::CrawledUrl => Ok(IngestionSource::CrawledUrl {
                url: parse_http_url(&item)?,
            }),
            DocumentType::YoutubeVideo => Ok(IngestionSource::YoutubeVideo {
                url: parse_http_url(&item)?,
            }),
            _ => Err(invalid_document_type()),
        }
    }

    pub fn document_type(&self) -> DocumentType {
        match self {
            IngestionSource::Extension { .. } => DocumentType::Extension,
            IngestionSource::CrawledUrl { .. } => DocumentType::CrawledUrl,
            IngestionSource::File { .. } => DocumentType::File,
            IngestionSource::YoutubeVideo { .. } => DocumentType::YoutubeVideo,
        }
    }

    /// Short human-readable identification for logs and errors
    pub fn label(&self) -> &str {
        match self {
            IngestionSource::Extension { capture } => &capture.metadata.url,
            IngestionSource::CrawledUrl { url } | IngestionSource::YoutubeVideo { url } => url,
            IngestionSource::File { filename, .. } => filename,
        }
    }

    pub fn staged_path(&self) -> Option<&Path> {
        match self {
            IngestionSource::File { staged_path, .. } => Some(staged_path),
            _ => None,
        }
    }
}

pub(crate) fn invalid_document_type() -> ServiceError {
    ServiceError::InvalidRequest {
        message: "Invalid document type".to_string(),
    }
}

fn parse_http_url(item: &serde_json::Value) -> ServiceResult<String> {
    let raw = item.as_str().ok_or_else(|| ServiceError::InvalidRequest {
        message: "Expected a URL string".to_string(),
    })?;

    let url = url::Url::parse(raw.trim()).map_err(|e| ServiceError::InvalidRequest {
        message: format!("Invalid URL {}: {}", raw, e),
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ServiceError::InvalidRequest {
            message: format!("Unsupported URL scheme: {}", url.scheme()),
        });
    }

    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn capture_json() -> serde_json::Value {
        json!({
            "metadata": {
                "BrowsingSessionId": "s-1",
                "VisitedWebPageURL": "https://example.com/a",
                "VisitedWebPageTitle": "Example",
                "VisitedWebPageDateWithTimeInISOString": "2024-05-01T10:00:00Z",
                "VisitedWebPageReffererURL": "https://example.com",
                "VisitedWebPageVisitDurationInMilliseconds": "1200"
            },
            "pageContent": "Hello from the page"
        })
    }

    #[test]
    fn test_extension_item_parses() {
        let source =
            IngestionSource::from_submission(DocumentType::Extension, capture_json()).unwrap();
        let IngestionSource::Extension { capture } = &source else {
            panic!("expected extension source");
        };
        assert_eq!(capture.metadata.title, "Example");
        assert_eq!(source.label(), "https://example.com/a");

        let markdown = capture.to_markdown();
        assert!(markdown.starts_with("# Example"));
        assert!(markdown.contains("- Referrer: https://example.com"));
        assert!(markdown.ends_with("Hello from the page"));
    }

    #[test]
    fn test_file_type_is_rejected_for_json_submissions() {
        let err = IngestionSource::from_submission(DocumentType::File, json!("x")).unwrap_err();
        assert_eq!(err.to_string(), "Invalid document type");
    }

    #[test]
    fn test_crawled_url_requires_http() {
        assert!(
            IngestionSource::from_submission(DocumentType::CrawledUrl, json!("ftp://x.org"))
                .is_err()
        );
        assert!(IngestionSource::from_submission(DocumentType::CrawledUrl, json!(42)).is_err());
        let source =
            IngestionSource::from_submission(DocumentType::CrawledUrl, json!("https://x.org/p"))
                .unwrap();
        assert_eq!(source.document_type(), DocumentType::CrawledUrl);
    }

    #[test]
    fn test_source_serializes_tagged() {
        let source = IngestionSource::File {
            staged_path: PathBuf::from("/data/uploads/upload-1.pdf"),
            filename: "a.pdf".to_string(),
        };
        let value = serde_json::to_value(&source).unwrap();
        assert_eq!(value["kind"], "file");
        assert_eq!(source.staged_path(), Some(Path::new("/data/uploads/upload-1.pdf")));
    }
}
