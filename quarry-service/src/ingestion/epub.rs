//! EPUB document extraction.

use std::path::Path;

use tracing::debug;

use crate::error::{ProcessingError, ServiceResult};

use super::Section;
use super::html::{extract_title, html_to_text};

/// Extract one section per spine item, in reading order.
pub fn extract_epub(path: &Path) -> ServiceResult<Vec<Section>> {
    let mut archive =
        epub::doc::EpubDoc::new(path).map_err(|e| ProcessingError::EpubRead(e.to_string()))?;

    let mut sections = Vec::new();
    let mut chapter_index = 0;

    loop {
        if let Some((content, _mime)) = archive.get_current_str() {
            let text = html_to_text(&content);

            if !text.is_empty() {
                sections.push(Section {
                    title: extract_title(&content),
                    content: text,
                    page_number: Some(chapter_index),
                });
                chapter_index += 1;
            }
        }

        if !archive.go_next() {
            break;
        }
    }

    debug!(chapters = sections.len(), "EPUB extracted");

    Ok(sections)
}
