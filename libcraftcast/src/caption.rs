//! Caption composition
//!
//! Builds the posted caption from the work title, its optional custom
//! caption, the completion date, and tag text. Work-specific tags follow
//! the configured default tags, each on its own line.

use chrono::NaiveDate;

/// Normalize a raw tag string into `#`-prefixed tags.
///
/// Splits on ASCII and ideographic whitespace, strips surrounding quotes,
/// and prefixes `#` where missing.
fn normalize_tags(raw: &str) -> Vec<String> {
    let cleaned = raw.trim().trim_matches(|c| c == '\'' || c == '"');

    cleaned
        .replace('\u{3000}', " ")
        .split_whitespace()
        .filter(|t| !t.is_empty())
        .map(|t| {
            if t.starts_with('#') {
                t.to_string()
            } else {
                format!("#{}", t)
            }
        })
        .collect()
}

/// Compose the caption for a work.
pub fn compose_caption(
    title: &str,
    custom_caption: Option<&str>,
    completion_date: Option<NaiveDate>,
    tags: Option<&str>,
    default_tags: &str,
) -> String {
    let mut lines: Vec<String> = Vec::new();

    if !title.trim().is_empty() {
        lines.push(title.trim().to_string());
    }

    if let Some(custom) = custom_caption {
        if !custom.trim().is_empty() {
            lines.push(custom.trim().to_string());
        }
    }

    if let Some(date) = completion_date {
        lines.push(String::new());
        lines.push(format!("Completed: {}", date.format("%Y-%m-%d")));
    }

    let caption = lines.join("\n");

    let default_line = normalize_tags(default_tags).join(" ");
    let custom_line = tags.map(normalize_tags).unwrap_or_default().join(" ");

    // Default tags first, work-specific tags on a separate line.
    let tag_block = match (default_line.is_empty(), custom_line.is_empty()) {
        (false, false) => format!("{}\n{}", default_line, custom_line),
        (false, true) => default_line,
        (true, false) => custom_line,
        (true, true) => String::new(),
    };

    if caption.is_empty() {
        return tag_block;
    }
    if tag_block.is_empty() {
        return caption;
    }

    let separator = if completion_date.is_some() { "\n" } else { "\n\n" };
    format!("{}{}{}", caption, separator, tag_block)
}
