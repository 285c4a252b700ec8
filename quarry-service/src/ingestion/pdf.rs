//! PDF text extraction.
//!
//! PDFium is bound at runtime, so a missing library only fails PDF jobs rather
//! than the whole service.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use pdfium_render::prelude::*;
use tracing::{debug, warn};

use crate::error::{ProcessingError, ServiceResult};

use super::Section;

/// Pages needed before repeated lines are treated as running headers/footers.
const MIN_PAGES_FOR_HEADER_DETECTION: usize = 3;

/// Create a new Pdfium instance (dynamically linked).
///
/// Searches the working directory, `./vendor/pdfium/lib/`, then the system
/// library paths.
pub fn create_pdfium() -> Result<Pdfium, ProcessingError> {
    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(
                "./vendor/pdfium/lib/",
            ))
        })
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| ProcessingError::TextExtraction {
            page: 0,
            source: Box::new(std::io::Error::other(format!(
                "PDFium library not available: {:?}",
                e
            ))),
        })?;

    Ok(Pdfium::new(bindings))
}

/// Extract one section per non-empty page, with running headers removed.
pub fn extract_pdf(path: &Path) -> ServiceResult<Vec<Section>> {
    let pdfium = create_pdfium()?;

    let document =
        pdfium
            .load_pdf_from_file(path, None)
            .map_err(|e| ProcessingError::TextExtraction {
                page: 0,
                source: Box::new(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("Failed to load PDF: {:?}", e),
                )),
            })?;

    let mut pages: Vec<(i32, String)> = Vec::new();
    for (page_index, page) in document.pages().iter().enumerate() {
        let page_num = page_index as i32 + 1;

        let text = page.text().map_err(|e| {
            warn!(page = page_num, error = ?e, "Failed to get text object for page");
            ProcessingError::TextExtraction {
                page: page_num as u32,
                source: Box::new(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("{:?}", e),
                )),
            }
        })?;

        let page_text = text.all().trim().to_string();
        if !page_text.is_empty() {
            pages.push((page_num, page_text));
        }
    }

    let repeated = repeated_lines(&pages);

    let sections: Vec<Section> = pages
        .into_iter()
        .filter_map(|(page_num, text)| {
            let content = text
                .lines()
                .filter(|line| !repeated.contains(line.trim()))
                .collect::<Vec<_>>()
                .join("\n");
            let content = content.trim();
            (!content.is_empty()).then(|| Section {
                title: None,
                content: content.to_string(),
                page_number: Some(page_num),
            })
        })
        .collect();

    debug!(
        sections = sections.len(),
        repeated_lines = repeated.len(),
        "PDF text extracted"
    );

    Ok(sections)
}

/// Lines present on more than half of the pages.
fn repeated_lines(pages: &[(i32, String)]) -> HashSet<String> {
    if pages.len() < MIN_PAGES_FOR_HEADER_DETECTION {
        return HashSet::new();
    }

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for (_, text) in pages {
        let unique: HashSet<&str> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        for line in unique {
            *counts.entry(line).or_default() += 1;
        }
    }

    let threshold = pages.len() / 2;
    counts
        .into_iter()
        .filter(|(_, count)| *count > threshold)
        .map(|(line, _)| line.to_string())
        .collect()
}
