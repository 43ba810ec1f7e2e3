//! Narrative parser: tutorial text → stage-tagged sections.
//!
//! Parsing is lossless. The preamble plus each section's raw heading and raw
//! body concatenate back to the input, so an unedited document renders
//! byte-for-byte and edits only touch the sections they target.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, instrument};

use docsync_markdown::{Heading, scan, split_lines};
use docsync_shared::{DocSyncError, NarrativeDocument, NarrativeSection, Result, Stage};

use crate::vocabulary::Vocabulary;

/// `<!-- stage: tool-using -->` as the first non-blank body line pins a section's stage.
static STAGE_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*<!--\s*stage\s*:\s*([A-Za-z _-]+?)\s*-->\s*$").expect("valid regex")
});

/// Parse tutorial text into a [`NarrativeDocument`].
///
/// - A single leading H1 followed by deeper headings is the document title
///   and stays in the preamble.
/// - Sections split on the shallowest remaining heading level; deeper
///   headings stay inside section bodies.
/// - Each section's stage comes from a stage marker, else from classifying
///   its title. Unmatched sections inherit the previous stage (the first
///   stage before any match) and backwards matches are clamped so stages
///   never decrease.
#[instrument(skip_all, fields(len = text.len()))]
pub fn parse_narrative(text: &str, vocabulary: &Vocabulary) -> Result<NarrativeDocument> {
    let headings = scan(text);
    let candidates = without_title(&headings);

    let Some(section_level) = candidates.iter().map(|h| h.level).min() else {
        return Err(DocSyncError::parse(
            "no headings found; the narrative has no sections",
        ));
    };

    let boundaries: Vec<&Heading> = candidates
        .into_iter()
        .filter(|h| h.level == section_level)
        .collect();

    let lines = split_lines(text);
    let preamble = lines[..boundaries[0].line].concat();

    let mut sections = Vec::with_capacity(boundaries.len());
    let mut ids = HashSet::new();
    let mut running: Option<Stage> = None;

    for (position, heading) in boundaries.iter().enumerate() {
        let body_start = heading.line + heading.line_count;
        let body_end = boundaries
            .get(position + 1)
            .map_or(lines.len(), |next| next.line);

        let raw_heading = lines[heading.line..body_start].concat();
        let body = lines[body_start..body_end].concat();

        let matched = stage_marker(&body).or_else(|| vocabulary.classify(&heading.text));
        let stage = match (matched, running) {
            (Some(found), Some(current)) if found < current => {
                debug!(title = %heading.text, %found, %current, "stage clamped to keep order");
                current
            }
            (Some(found), _) => found,
            (None, Some(current)) => current,
            (None, None) => Stage::Basic,
        };
        if matched.is_some() {
            running = Some(stage);
        }

        let id = unique_id(&slugify(&heading.text), &mut ids);
        debug!(%id, %stage, level = heading.level, "section parsed");

        sections.push(NarrativeSection {
            id,
            stage,
            title: heading.text.clone(),
            level: heading.level,
            heading: raw_heading,
            body,
            position,
        });
    }

    debug!(sections = sections.len(), section_level, "narrative parsed");

    Ok(NarrativeDocument { preamble, sections })
}

/// Drop a lone leading H1 when deeper headings follow it.
fn without_title(headings: &[Heading]) -> Vec<&Heading> {
    let h1_count = headings.iter().filter(|h| h.level == 1).count();
    match headings.first() {
        Some(first) if first.level == 1 && h1_count == 1 && headings.len() > 1 => {
            headings[1..].iter().collect()
        }
        _ => headings.iter().collect(),
    }
}

fn stage_marker(body: &str) -> Option<Stage> {
    let line = body.lines().find(|l| !l.trim().is_empty())?;
    let caps = STAGE_MARKER_RE.captures(line)?;
    caps[1].parse().ok()
}

/// Lowercase slug: alphanumerics kept, everything else collapsed to `-`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.to_lowercase().chars() {
        if c.is_alphanumeric() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        "section".to_string()
    } else {
        slug
    }
}

/// Reserve `base`, or `base-2`, `base-3`, ... if taken.
pub(crate) fn unique_id(base: &str, taken: &mut HashSet<String>) -> String {
    let mut candidate = base.to_string();
    let mut n = 2;
    while taken.contains(&candidate) {
        candidate = format!("{base}-{n}");
        n += 1;
    }
    taken.insert(candidate.clone());
    candidate
}
