//! Plain-text helpers for topic descriptions.

use std::sync::LazyLock;

use regex::Regex;

use crate::headings::{fence_marker, strip_eol};

/// Longest description kept for a topic.
pub const MAX_LEAD_CHARS: usize = 240;

/// Reduce inline Markdown to plain text: link text only, no images, no HTML,
/// no emphasis or code marks, single spaces.
pub fn plain(md: &str) -> String {
    static IMAGE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").expect("valid regex"));
    static LINK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").expect("valid regex"));
    static REF_LINK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\[[^\]]*\]").expect("valid regex"));
    static TAG_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"</?[A-Za-z][^>]*>").expect("valid regex"));

    let text = IMAGE_RE.replace_all(md, "");
    let text = LINK_RE.replace_all(&text, "$1");
    let text = REF_LINK_RE.replace_all(&text, "$1");
    let text = TAG_RE.replace_all(&text, "");
    let text = text
        .replace("**", "")
        .replace("__", "")
        .replace(['`', '*', '\u{200B}'], "");

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First prose paragraph in a run of lines, as plain text.
///
/// Code fences, tables, images, HTML comments, lists and indented code are
/// skipped; the result is cut to [`MAX_LEAD_CHARS`] at a word boundary.
pub fn lead_paragraph(lines: &[&str]) -> Option<String> {
    let mut fence: Option<(char, usize)> = None;
    let mut i = 0;

    while i < lines.len() {
        let line = strip_eol(lines[i]);
        let trimmed = line.trim();

        if let Some(open) = fence {
            if fence_marker(trimmed).is_some_and(|m| m.0 == open.0 && m.1 >= open.1) {
                fence = None;
            }
            i += 1;
            continue;
        }
        if trimmed.is_empty() {
            i += 1;
            continue;
        }
        if let Some(marker) = fence_marker(trimmed) {
            fence = Some(marker);
            i += 1;
            continue;
        }

        if is_non_prose(line) {
            while i < lines.len() && !strip_eol(lines[i]).trim().is_empty() {
                i += 1;
            }
            continue;
        }

        let mut paragraph = Vec::new();
        while i < lines.len() {
            let current = strip_eol(lines[i]).trim();
            if current.is_empty() || fence_marker(current).is_some() || current.starts_with('#') {
                break;
            }
            paragraph.push(current);
            i += 1;
        }

        let text = plain(&paragraph.join(" "));
        if !text.is_empty() {
            return Some(truncate_words(&text, MAX_LEAD_CHARS));
        }
    }

    None
}

/// Cut `text` to at most `max` characters, ending on a word boundary.
pub fn truncate_words(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    let head = match cut.rfind(char::is_whitespace) {
        Some(idx) if idx > 0 => &cut[..idx],
        _ => cut.as_str(),
    };
    format!("{}...", head.trim_end_matches([',', ';', ':', '.']))
}

fn is_non_prose(line: &str) -> bool {
    let trimmed = line.trim_start();
    line.len() - trimmed.len() >= 4
        || trimmed.starts_with('|')
        || trimmed.starts_with("<!--")
        || trimmed.starts_with("![")
        || trimmed.starts_with("- ")
        || trimmed.starts_with("* ")
        || trimmed.starts_with("+ ")
        || trimmed.starts_with('<')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_strips_inline_markup() {
        let md = "Use **sessions** with [`ChatAgent`](/api) and ![img](x.png) <b>now</b>.";
        assert_eq!(plain(md), "Use sessions with ChatAgent and now.");
    }

    #[test]
    fn lead_skips_code_tables_and_lists() {
        let lines = vec![
            "\n",
            "```python\n",
            "agent = build()\n",
            "```\n",
            "\n",
            "| a | b |\n",
            "|---|---|\n",
            "\n",
            "- bullet\n",
            "\n",
            "Tools let an agent call functions.\n",
        ];
        assert_eq!(
            lead_paragraph(&lines).as_deref(),
            Some("Tools let an agent call functions.")
        );
    }

    #[test]
    fn lead_is_none_without_prose() {
        let lines = vec!["\n", "```\n", "code\n", "```\n"];
        assert_eq!(lead_paragraph(&lines), None);
    }

    #[test]
    fn truncate_ends_on_word_boundary() {
        let text = "alpha beta gamma delta";
        assert_eq!(truncate_words(text, 12), "alpha beta...");
        assert_eq!(truncate_words(text, 100), text);
    }
}
