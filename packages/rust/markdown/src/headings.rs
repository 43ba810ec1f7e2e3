//! Fence-aware heading scanner.
//!
//! Tutorials exported from notebooks are full of `# comment` lines inside
//! code cells, and reference sites mix ATX and setext styles. The scanner
//! only reports real headings and keeps the line span of each one so callers
//! can slice the original text without losing a byte.

use std::sync::LazyLock;

use regex::Regex;

use docsync_shared::OutlineHeading;

use crate::text;

/// A heading found in Markdown text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    /// Level 1–6.
    pub level: u8,
    /// Cleaned heading text (no link syntax, anchors or emphasis).
    pub text: String,
    /// Index of the first line, counting lines as produced by [`split_lines`].
    pub line: usize,
    /// 1 for ATX headings, 2 for setext headings.
    pub line_count: usize,
}

/// Split text into lines, keeping line terminators so the pieces concatenate
/// back to the original.
pub fn split_lines(md: &str) -> Vec<&str> {
    md.split_inclusive('\n').collect()
}

/// Find every heading outside fenced code and front matter.
pub fn scan(md: &str) -> Vec<Heading> {
    let lines = split_lines(md);
    let mut headings = Vec::new();
    let mut fence: Option<(char, usize)> = None;
    let mut i = front_matter_end(&lines);

    while i < lines.len() {
        let line = strip_eol(lines[i]);
        let trimmed = line.trim_start();
        let indented = line.len() - trimmed.len() >= 4;

        if let Some(open) = fence {
            if !indented && is_fence_close(trimmed, open) {
                fence = None;
            }
            i += 1;
            continue;
        }

        if indented {
            i += 1;
            continue;
        }

        if let Some(marker) = fence_marker(trimmed) {
            fence = Some(marker);
            i += 1;
            continue;
        }

        if let Some((level, raw)) = atx_heading(trimmed) {
            let text = clean_heading_text(raw);
            if !text.is_empty() {
                headings.push(Heading {
                    level,
                    text,
                    line: i,
                    line_count: 1,
                });
            }
            i += 1;
            continue;
        }

        let starts_paragraph = i == 0 || strip_eol(lines[i - 1]).trim().is_empty();
        if starts_paragraph && is_setext_candidate(trimmed) {
            if let Some(level) = lines.get(i + 1).and_then(|next| setext_level(strip_eol(next))) {
                let text = clean_heading_text(trimmed);
                if !text.is_empty() {
                    headings.push(Heading {
                        level,
                        text,
                        line: i,
                        line_count: 2,
                    });
                    i += 2;
                    continue;
                }
            }
        }

        i += 1;
    }

    headings
}

/// Text of paragraphs that consist of a single bold line, such as
/// `**Retries**`. These act as headings below level 6.
pub fn bold_leads(md: &str) -> Vec<String> {
    static BOLD_LINE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^\*\*([^*]+)\*\*$").expect("valid regex"));

    let lines = split_lines(md);
    let blank = |idx: usize| lines.get(idx).is_none_or(|l| strip_eol(l).trim().is_empty());
    let mut leads = Vec::new();
    let mut fence: Option<(char, usize)> = None;

    for (i, raw) in lines.iter().enumerate() {
        let trimmed = strip_eol(raw).trim();
        if let Some(open) = fence {
            if is_fence_close(trimmed, open) {
                fence = None;
            }
            continue;
        }
        if let Some(marker) = fence_marker(trimmed) {
            fence = Some(marker);
            continue;
        }
        let alone = (i == 0 || blank(i - 1)) && blank(i + 1);
        if let Some(caps) = BOLD_LINE_RE.captures(trimmed).filter(|_| alone) {
            let text = clean_heading_text(&caps[1]);
            if !text.is_empty() {
                leads.push(text);
            }
        }
    }

    leads
}

/// Headings with the lead paragraph under each, as stored in a corpus page.
pub fn outline(md: &str) -> Vec<OutlineHeading> {
    let lines = split_lines(md);
    let headings = scan(md);

    headings
        .iter()
        .enumerate()
        .map(|(idx, heading)| {
            let start = heading.line + heading.line_count;
            let end = headings.get(idx + 1).map_or(lines.len(), |next| next.line);
            OutlineHeading {
                level: heading.level,
                text: heading.text.clone(),
                lead: text::lead_paragraph(&lines[start.min(end)..end]),
            }
        })
        .collect()
}

/// Strip link syntax, custom ids, inline markup and HTML from heading text.
pub fn clean_heading_text(raw: &str) -> String {
    static CUSTOM_ID_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\s*\{#[^}]*\}\s*$").expect("valid regex"));

    let without_id = CUSTOM_ID_RE.replace(raw, "");
    let plain = text::plain(&without_id);
    plain.trim_end_matches(':').trim().to_string()
}

/// If `trimmed` opens or closes a code fence, return its character and run length.
pub(crate) fn fence_marker(trimmed: &str) -> Option<(char, usize)> {
    let ch = trimmed.chars().next()?;
    if ch != '`' && ch != '~' {
        return None;
    }
    let run = trimmed.chars().take_while(|c| *c == ch).count();
    if run < 3 {
        return None;
    }
    // Backtick fences may not carry backticks in their info string.
    if ch == '`' && trimmed[run..].contains('`') {
        return None;
    }
    Some((ch, run))
}

fn is_fence_close(trimmed: &str, open: (char, usize)) -> bool {
    let run = trimmed.chars().take_while(|c| *c == open.0).count();
    run >= open.1 && trimmed[run * open.0.len_utf8()..].trim().is_empty()
}

fn atx_heading(trimmed: &str) -> Option<(u8, &str)> {
    let hashes = trimmed.chars().take_while(|c| *c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &trimmed[hashes..];
    if !rest.is_empty() && !rest.starts_with([' ', '\t']) {
        return None;
    }

    // Optional closing sequence: `## Title ##`
    let mut content = rest.trim();
    let closing = content.trim_end_matches('#');
    if closing.is_empty() || closing.ends_with([' ', '\t']) {
        content = closing.trim_end();
    }

    Some((hashes as u8, content))
}

fn is_setext_candidate(trimmed: &str) -> bool {
    if trimmed.is_empty() {
        return false;
    }
    let first = trimmed.chars().next().unwrap_or(' ');
    !matches!(first, '-' | '*' | '+' | '>' | '|' | '<' | '=' | '!')
        && !trimmed.starts_with(|c: char| c.is_ascii_digit() && trimmed.contains(". "))
}

fn setext_level(next: &str) -> Option<u8> {
    let underline = next.trim();
    if underline.len() < 2 || next.len() - next.trim_start().len() >= 4 {
        return None;
    }
    if underline.chars().all(|c| c == '=') {
        Some(1)
    } else if underline.chars().all(|c| c == '-') {
        Some(2)
    } else {
        None
    }
}

fn front_matter_end(lines: &[&str]) -> usize {
    if lines.first().map(|l| strip_eol(l).trim_end()) != Some("---") {
        return 0;
    }
    lines
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, l)| matches!(strip_eol(l).trim_end(), "---" | "..."))
        .map_or(0, |(idx, _)| idx + 1)
}

pub(crate) fn strip_eol(line: &str) -> &str {
    line.trim_end_matches(['\n', '\r'])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn levels_and_text(md: &str) -> Vec<(u8, String)> {
        scan(md).into_iter().map(|h| (h.level, h.text)).collect()
    }

    #[test]
    fn finds_atx_headings() {
        let md = "# Title\n\nIntro\n\n## Setup\n\n### Install ###\n";
        assert_eq!(
            levels_and_text(md),
            vec![
                (1, "Title".to_string()),
                (2, "Setup".to_string()),
                (3, "Install".to_string())
            ]
        );
    }

    #[test]
    fn ignores_comments_inside_fences() {
        let md = "## Tools\n\n```python\n# not a heading\n```\n\n~~~~\n## nor this\n~~~~\n\n## Memory\n";
        let found = levels_and_text(md);
        assert_eq!(found.len(), 2);
        assert_eq!(found[1].1, "Memory");
    }

    #[test]
    fn finds_setext_headings_with_span() {
        let md = "Getting Started\n===============\n\nText\n\nRemembering Things\n------------------\n";
        let found = scan(md);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].level, 1);
        assert_eq!(found[1].level, 2);
        assert_eq!(found[1].line, 5);
        assert_eq!(found[1].line_count, 2);
    }

    #[test]
    fn thematic_break_after_list_is_not_a_heading() {
        let md = "- item\n---\n\nparagraph\n";
        assert!(scan(md).is_empty());
    }

    #[test]
    fn skips_front_matter() {
        let md = "---\ntitle: x\n---\n# Real\n";
        let found = scan(md);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].line, 3);
    }

    #[test]
    fn hashtag_without_space_is_text() {
        assert!(scan("#hashtag\n").is_empty());
    }

    #[test]
    fn heading_text_is_cleaned() {
        assert_eq!(
            clean_heading_text("Using [`Tool`](/api/tool) calls {#tool-calls}"),
            "Using Tool calls"
        );
        assert_eq!(clean_heading_text("**Step 2:** Memory:"), "Step 2: Memory");
    }

    #[test]
    fn outline_carries_lead_paragraphs() {
        let md = "# Sessions\n\nSessions keep history.\nAcross turns.\n\nMore.\n\n## Storage\n\n```\ncode\n```\n\nStores state.\n";
        let outline = outline(md);
        assert_eq!(outline.len(), 2);
        assert_eq!(outline[0].lead.as_deref(), Some("Sessions keep history. Across turns."));
        assert_eq!(outline[1].lead.as_deref(), Some("Stores state."));
    }

    #[test]
    fn bold_lines_standing_alone_are_leads() {
        let md = "**Retries**\n\nBack off.\n\nSome **inline** bold.\n**Not alone**\nx\n\n```\n**in code**\n```\n";
        assert_eq!(bold_leads(md), vec!["Retries".to_string()]);
    }

    #[test]
    fn split_lines_is_lossless() {
        let md = "a\r\nb\n\nc";
        assert_eq!(split_lines(md).concat(), md);
    }
}
