//! HTML to text conversion, shared by uploaded HTML files, EPUB chapters and
//! crawled pages.

use std::path::Path;

use crate::error::{ProcessingError, ServiceResult};

use super::Section;

/// Elements whose content is never visible text.
const HIDDEN_ELEMENTS: [&str; 4] = ["script", "style", "noscript", "template"];

/// Elements that start a new line of text.
const BLOCK_ELEMENTS: [&str; 18] = [
    "p", "div", "br", "li", "ul", "ol", "tr", "table", "section", "article", "header", "footer",
    "h1", "h2", "h3", "h4", "h5", "h6",
];

/// Extract content from an HTML file.
pub fn extract_html(path: &Path) -> ServiceResult<Vec<Section>> {
    let raw = std::fs::read(path).map_err(ProcessingError::Io)?;
    let html = String::from_utf8_lossy(&raw);

    let content = html_to_text(&html);
    if content.is_empty() {
        return Ok(Vec::new());
    }

    Ok(vec![Section {
        title: extract_title(&html),
        content,
        page_number: None,
    }])
}

/// Text of the first `<title>` element, if any.
pub fn extract_title(html: &str) -> Option<String> {
    let lower = html.to_ascii_lowercase();
    let open = lower.find("<title")?;
    let content_start = open + lower[open..].find('>')? + 1;
    let content_end = content_start + lower[content_start..].find("</title")?;

    let title = collapse_whitespace(&decode_entities(&html[content_start..content_end]));
    (!title.is_empty()).then_some(title)
}

/// Visible text of an HTML document.
///
/// Hidden elements and comments are dropped, block elements become line
/// breaks, inline tags disappear and entities are decoded.
pub fn html_to_text(html: &str) -> String {
    let mut cleaned = strip_comments(html);
    for element in HIDDEN_ELEMENTS {
        cleaned = strip_element_blocks(&cleaned, element);
    }
    if let Some(body) = body_slice(&cleaned) {
        cleaned = body.to_string();
    }

    let mut text = String::with_capacity(cleaned.len());
    let mut rest = cleaned.as_str();
    while let Some(open) = rest.find('<') {
        text.push_str(&rest[..open]);
        let Some(close) = rest[open..].find('>') else {
            rest = "";
            break;
        };
        let tag = &rest[open + 1..open + close];
        if BLOCK_ELEMENTS.contains(&tag_name(tag).as_str()) {
            text.push('\n');
        } else {
            text.push(' ');
        }
        rest = &rest[open + close + 1..];
    }
    text.push_str(rest);

    decode_entities(&text)
        .lines()
        .map(collapse_whitespace)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn tag_name(tag: &str) -> String {
    tag.trim_start_matches('/')
        .split(|c: char| c.is_whitespace() || c == '/')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

fn body_slice(html: &str) -> Option<&str> {
    let lower = html.to_ascii_lowercase();
    let open = lower.find("<body")?;
    let start = open + lower[open..].find('>')? + 1;
    let end = lower.rfind("</body").filter(|end| *end >= start).unwrap_or(html.len());
    Some(&html[start..end])
}

fn strip_comments(html: &str) -> String {
    let mut output = String::with_capacity(html.len());
    let mut rest = html;
    while let Some(start) = rest.find("<!--") {
        output.push_str(&rest[..start]);
        match rest[start..].find("-->") {
            Some(end) => rest = &rest[start + end + 3..],
            None => {
                rest = "";
                break;
            }
        }
    }
    output.push_str(rest);
    output
}

/// Remove `<name ...>...</name>` blocks, case-insensitively.
fn strip_element_blocks(html: &str, name: &str) -> String {
    let open_pattern = format!("<{}", name);
    let close_pattern = format!("</{}>", name);
    let lower = html.to_ascii_lowercase();
    let mut output = String::with_capacity(html.len());
    let mut cursor = 0usize;

    while let Some(open_rel) = lower[cursor..].find(&open_pattern) {
        let open_idx = cursor + open_rel;
        // `<style` must not match `<styles`
        let next = lower[open_idx + open_pattern.len()..].chars().next();
        if next.is_some_and(|c| c.is_ascii_alphanumeric()) {
            output.push_str(&html[cursor..open_idx + open_pattern.len()]);
            cursor = open_idx + open_pattern.len();
            continue;
        }

        output.push_str(&html[cursor..open_idx]);
        match lower[open_idx..].find(&close_pattern) {
            Some(close_rel) => cursor = open_idx + close_rel + close_pattern.len(),
            None => return output,
        }
    }

    output.push_str(&html[cursor..]);
    output
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Decode named entities that commonly appear in prose plus numeric references.
pub fn decode_entities(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(amp) = rest.find('&') {
        output.push_str(&rest[..amp]);
        let candidate = &rest[amp..];
        let decoded = candidate
            .find(';')
            .filter(|end| *end <= 10)
            .and_then(|end| decode_entity(&candidate[1..end]).map(|c| (c, end)));

        match decoded {
            Some((c, end)) => {
                output.push(c);
                rest = &candidate[end + 1..];
            }
            None => {
                output.push('&');
                rest = &candidate[1..];
            }
        }
    }

    output.push_str(rest);
    output
}

fn decode_entity(entity: &str) -> Option<char> {
    if let Some(numeric) = entity.strip_prefix('#') {
        let code = match numeric.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => numeric.parse().ok()?,
        };
        return char::from_u32(code);
    }

    let c = match entity {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        "mdash" => '\u{2014}',
        "ndash" => '\u{2013}',
        "hellip" => '\u{2026}',
        "copy" => '\u{a9}',
        "rsquo" => '\u{2019}',
        "lsquo" => '\u{2018}',
        "rdquo" => '\u{201d}',
        "ldquo" => '\u{201c}',
        _ => return None,
    };
    Some(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visible_text_only() {
        let html = r#"<html><head><title>Doc &amp; Co</title>
            <style>body { color: red; }</style></head>
            <body><h1>Heading</h1><!-- hidden --><p>Hello <b>world</b>!</p>
            <script>alert("x")</script><p>Second&nbsp;line &#169; &#x41;</p></body></html>"#;

        let text = html_to_text(html);
        assert_eq!(text, "Heading\nHello world !\nSecond line \u{a9} A");
        assert_eq!(extract_title(html), Some("Doc & Co".to_string()));
    }

    #[test]
    fn test_unknown_entities_are_kept() {
        assert_eq!(decode_entities("AT&T &bogus; &lt;"), "AT&T &bogus; <");
    }

    #[test]
    fn test_missing_title() {
        assert_eq!(extract_title("<p>no title</p>"), None);
        assert_eq!(extract_title("<title>   </title>"), None);
    }

    #[test]
    fn test_unterminated_script_drops_rest() {
        assert_eq!(html_to_text("<p>keep</p><script>var x = 1;"), "keep");
    }
}
