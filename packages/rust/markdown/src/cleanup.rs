//! Post-conversion cleanup pipeline for fetched reference pages.
//!
//! Each cleanup pass is a function `&str -> String` applied in sequence.
//! The passes exist so headings come out in one predictable shape regardless
//! of which site generator produced the page.

use std::sync::LazyLock;

use regex::Regex;

use crate::headings::fence_marker;

/// Run the full cleanup pipeline on raw Markdown text.
pub(crate) fn run_pipeline(md: &str) -> String {
    let mut result = md.to_string();

    result = strip_permalink_anchors(&result);
    result = demote_extra_h1(&result);
    result = strip_leftover_html(&result);
    result = clean_blank_lines(&result);
    result = trim_line_ends(&result);
    result = ensure_trailing_newline(&result);

    result
}

// ---------------------------------------------------------------------------
// Pass 1: Permalink anchors
// ---------------------------------------------------------------------------

/// Remove the "direct link" anchors doc generators attach to headings,
/// e.g. `## Tools[​](#tools "Direct link to Tools")` or `## Tools [#](#tools)`.
fn strip_permalink_anchors(md: &str) -> String {
    static ANCHOR_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"\s*\[(?:\x{200B}|#|¶|🔗)?\]\(#[^)\s]*(?:\s+"[^"]*")?\)"#).expect("valid regex")
    });

    md.lines()
        .map(|line| {
            if line.trim_start().starts_with('#') {
                ANCHOR_RE.replace_all(line, "").replace('\u{200B}', "")
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Pass 2: Single H1
// ---------------------------------------------------------------------------

/// Keep the first H1 as the page title and demote later ones to H2.
fn demote_extra_h1(md: &str) -> String {
    let mut seen_h1 = false;
    let mut fence: Option<(char, usize)> = None;

    md.lines()
        .map(|line| {
            let trimmed = line.trim_start();
            if let Some(open) = fence {
                if fence_marker(trimmed).is_some_and(|m| m.0 == open.0 && m.1 >= open.1) {
                    fence = None;
                }
                return line.to_string();
            }
            if let Some(marker) = fence_marker(trimmed) {
                fence = Some(marker);
                return line.to_string();
            }
            if trimmed.starts_with("# ") {
                if seen_h1 {
                    return format!("#{trimmed}");
                }
                seen_h1 = true;
            }
            line.to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Pass 3: Strip leftover HTML
// ---------------------------------------------------------------------------

/// Remove layout tags htmd leaves behind, keeping their text. Fenced code is untouched.
fn strip_leftover_html(md: &str) -> String {
    static LAYOUT_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"</?(?:div|span|section|article|aside|header|footer|figure|figcaption|details|summary|a)(?:\s[^>]*)?>",
        )
        .expect("valid regex")
    });

    let mut fence: Option<(char, usize)> = None;
    md.lines()
        .map(|line| {
            let trimmed = line.trim_start();
            if let Some(open) = fence {
                if fence_marker(trimmed).is_some_and(|m| m.0 == open.0 && m.1 >= open.1) {
                    fence = None;
                }
                return line.to_string();
            }
            if let Some(marker) = fence_marker(trimmed) {
                fence = Some(marker);
                return line.to_string();
            }
            LAYOUT_TAG_RE.replace_all(line, "").to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Pass 4-6: Whitespace
// ---------------------------------------------------------------------------

/// Collapse runs of blank lines into a single blank line.
fn clean_blank_lines(md: &str) -> String {
    static MULTI_BLANK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n[ \t]*\n(?:[ \t]*\n)+").expect("valid regex"));

    MULTI_BLANK_RE.replace_all(md, "\n\n").to_string()
}

fn trim_line_ends(md: &str) -> String {
    md.lines().map(str::trim_end).collect::<Vec<_>>().join("\n")
}

/// Ensure the text ends with exactly one newline.
fn ensure_trailing_newline(md: &str) -> String {
    let trimmed = md.trim_matches('\n');
    format!("{trimmed}\n")
}
