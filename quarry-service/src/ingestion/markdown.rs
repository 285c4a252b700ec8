//! Markdown and plain text extraction.

use std::path::Path;

use crate::error::{ProcessingError, ServiceResult};

use super::Section;

/// Extract content from a Markdown file, one section per heading.
pub fn extract_markdown(path: &Path) -> ServiceResult<Vec<Section>> {
    let content = std::fs::read_to_string(path).map_err(ProcessingError::Io)?;
    Ok(parse_markdown_sections(&content))
}

/// Extract content from a plain text file as a single section.
pub fn extract_text(path: &Path) -> ServiceResult<Vec<Section>> {
    let content = std::fs::read_to_string(path).map_err(ProcessingError::Io)?;
    let content = content.trim();

    if content.is_empty() {
        return Ok(Vec::new());
    }

    Ok(vec![Section {
        title: None,
        content: content.to_string(),
        page_number: None,
    }])
}

/// Split Markdown into sections at ATX headings.
///
/// Lines inside fenced code blocks are never headings. Text before the first
/// heading becomes an untitled section.
pub fn parse_markdown_sections(content: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut title: Option<String> = None;
    let mut body = String::new();
    let mut in_fence = false;

    for line in content.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
        }

        let heading = if in_fence { None } else { heading_text(trimmed) };
        match heading {
            Some(text) => {
                push_section(&mut sections, title.take(), &body);
                body.clear();
                title = Some(text.to_string());
            }
            None => {
                body.push_str(line);
                body.push('\n');
            }
        }
    }
    push_section(&mut sections, title, &body);

    sections
}

fn push_section(sections: &mut Vec<Section>, title: Option<String>, body: &str) {
    let body = body.trim();
    if body.is_empty() {
        return;
    }
    sections.push(Section {
        title,
        content: body.to_string(),
        page_number: None,
    });
}

/// Heading text when `line` is an ATX heading (`#` to `######` then a space).
fn heading_text(line: &str) -> Option<&str> {
    let level = line.chars().take_while(|c| *c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }

    let rest = &line[level..];
    if !rest.is_empty() && !rest.starts_with([' ', '\t']) {
        return None;
    }

    Some(rest.trim().trim_end_matches('#').trim_end())
}
