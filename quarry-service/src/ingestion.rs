//! Content ingestion.
//!
//! Turns raw sources (extension captures, URLs, staged uploads) into documents:
//! extraction into text sections, hashing for deduplication, and word-window
//! chunking. The [`Ingestor`] trait is the single entry point the background
//! workers call.

mod crawler;
mod epub;
mod hash;
mod html;
mod ingestor;
mod markdown;
mod pdf;
mod sources;

pub use crawler::Crawler;
pub use hash::compute_content_hash;
pub use ingestor::{IngestOutcome, Ingestor, SourceIngestor};
pub use sources::IngestionSource;
pub(crate) use sources::invalid_document_type;

#[cfg(test)]
pub(crate) use crawler::test_server;

use std::path::Path;

use tracing::info;

use crate::config::IngestionConfig;
use crate::error::{ProcessingError, ServiceError, ServiceResult};

/// A titled span of extracted text
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub title: Option<String>,
    pub content: String,
    /// Page (PDF) or chapter (EPUB) the section came from
    pub page_number: Option<i32>,
}

/// Parse a file into ordered sections, dispatching on its extension.
///
/// This is blocking work; async callers should run it on the blocking pool.
pub fn parse_file(path: &Path) -> ServiceResult<Vec<Section>> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    info!(path = %path.display(), format = %extension, "Parsing file");

    match extension.as_str() {
        "pdf" => pdf::extract_pdf(path),
        "epub" => epub::extract_epub(path),
        "md" | "markdown" => markdown::extract_markdown(path),
        "txt" | "text" => markdown::extract_text(path),
        "html" | "htm" => html::extract_html(path),
        _ => Err(ServiceError::Processing(
            ProcessingError::UnsupportedFormat { format: extension },
        )),
    }
}

/// Join sections into one document body, emitting a heading whenever the
/// section title changes.
pub fn render_sections(sections: &[Section]) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(sections.len());
    let mut last_title: Option<&str> = None;

    for section in sections {
        match section.title.as_deref() {
            Some(title) if last_title != Some(title) => {
                parts.push(format!("## {}\n\n{}", title, section.content));
            }
            _ => parts.push(section.content.clone()),
        }
        last_title = section.title.as_deref();
    }

    parts.join("\n\n")
}

/// Splits text into overlapping word windows
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            overlap: overlap.min(chunk_size - 1),
        }
    }

    pub fn from_config(config: &IngestionConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    /// Windows of `chunk_size` words, each starting `chunk_size - overlap`
    /// words after the previous one. The last window ends at the last word.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.is_empty() {
            return Vec::new();
        }

        let step = self.chunk_size - self.overlap;
        let mut chunks = Vec::new();
        let mut start = 0;

        loop {
            let end = (start + self.chunk_size).min(words.len());
            chunks.push(words[start..end].join(" "));
            if end == words.len() {
                break;
            }
            start += step;
        }

        chunks
    }
}
