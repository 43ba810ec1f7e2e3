//! Change publisher: package an edit into one reviewable proposal.
//!
//! The publisher only produces data. Writing the edited narrative, the patch,
//! or the report anywhere is left to the caller.

use std::collections::HashMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::Serialize;
use similar::TextDiff;
use tracing::{info, instrument};

use docsync_shared::{
    Gap, NarrativeDocument, Omission, PlanningAmbiguityWarning, RunId, Stage, TopicKey,
};

use crate::editor::{AppliedEdit, EditKind, EditOutcome};

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// One line of the change summary: what was added, where, and why.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryEntry {
    pub topic: String,
    pub key: TopicKey,
    pub target_stage: Stage,
    pub insertion: EditKind,
    pub section_id: String,
    pub rationale: String,
}

impl From<&AppliedEdit> for SummaryEntry {
    fn from(edit: &AppliedEdit) -> Self {
        Self {
            topic: edit.topic.title.clone(),
            key: edit.topic.key.clone(),
            target_stage: edit.stage,
            insertion: edit.kind,
            section_id: edit.section_id.clone(),
            rationale: edit.rationale.clone(),
        }
    }
}

/// Everything a reviewer needs to judge one run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub run_id: RunId,
    pub generated_at: DateTime<Utc>,
    pub root: String,
    pub pages_fetched: usize,
    pub omissions: Vec<Omission>,
    pub external_topics: usize,
    pub narrative_topics: usize,
    pub gaps: usize,
    pub warnings: Vec<PlanningAmbiguityWarning>,
    pub unplaced: Vec<Gap>,
    pub summary: Vec<SummaryEntry>,
    pub up_to_date: bool,
}

impl SyncReport {
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            run_id: RunId::new(),
            generated_at: Utc::now(),
            root: root.into(),
            pages_fetched: 0,
            omissions: Vec::new(),
            external_topics: 0,
            narrative_topics: 0,
            gaps: 0,
            warnings: Vec::new(),
            unplaced: Vec::new(),
            summary: Vec::new(),
            up_to_date: true,
        }
    }

    /// Human-readable change report.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# Documentation sync report\n");
        let _ = writeln!(out, "- Run: `{}`", self.run_id);
        let _ = writeln!(out, "- Generated: {}", self.generated_at.to_rfc3339());
        let _ = writeln!(out, "- Source: {}", self.root);
        let _ = writeln!(
            out,
            "- Pages: {} fetched, {} omitted",
            self.pages_fetched,
            self.omissions.len()
        );
        let _ = writeln!(
            out,
            "- Topics: {} in reference, {} in narrative, {} missing",
            self.external_topics, self.narrative_topics, self.gaps
        );

        if self.up_to_date {
            let _ = writeln!(out, "\n## Up to date\n");
            let _ = writeln!(out, "No changes needed.");
        } else if self.summary.is_empty() {
            let _ = writeln!(out, "\n## No changes applied\n");
            let _ = writeln!(out, "Every missing topic targets a section that does not exist.");
        } else {
            let _ = writeln!(out, "\n## Changes\n");
            let _ = writeln!(out, "| Topic | Stage | Insertion | Section |");
            let _ = writeln!(out, "|---|---|---|---|");
            for entry in &self.summary {
                let insertion = match entry.insertion {
                    EditKind::Extend => "extend",
                    EditKind::Insert => "new section",
                };
                let _ = writeln!(
                    out,
                    "| {} | {} | {} | `{}` |",
                    entry.topic.replace('|', "\\|"),
                    entry.target_stage,
                    insertion,
                    entry.section_id
                );
            }
            let _ = writeln!(out, "\n### Rationale\n");
            for entry in &self.summary {
                let _ = writeln!(out, "- **{}**: {}", entry.topic, entry.rationale);
            }
        }

        if !self.warnings.is_empty() {
            let _ = writeln!(out, "\n## Needs review\n");
            for warning in &self.warnings {
                let best = warning.best_section.as_deref().unwrap_or("none");
                let _ = writeln!(
                    out,
                    "- **{}**: best match `{best}` scored {:.2}, below the {:.2} threshold; placed as a new section",
                    warning.title, warning.best_score, warning.threshold
                );
            }
        }

        if !self.unplaced.is_empty() {
            let _ = writeln!(out, "\n## Unplaced topics\n");
            for gap in &self.unplaced {
                let target = gap.target_section_id().unwrap_or("document start");
                let _ = writeln!(
                    out,
                    "- **{}** ({}): target `{target}` not found",
                    gap.topic.title, gap.candidate_stage
                );
            }
        }

        if !self.omissions.is_empty() {
            let _ = writeln!(out, "\n## Omitted pages\n");
            for omission in &self.omissions {
                let _ = writeln!(out, "- `{}`: {}", omission.page_id, omission.error);
            }
        }

        out
    }
}

// ---------------------------------------------------------------------------
// Proposal
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeKind {
    Added,
    Extended,
}

/// A section that differs between the original and edited document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionChange {
    pub section_id: String,
    pub title: String,
    pub stage: Stage,
    pub change: ChangeKind,
    /// Position in the edited document.
    pub position: usize,
}

/// The reviewable unit for a run that changed the narrative.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeSet {
    pub report: SyncReport,
    pub section_changes: Vec<SectionChange>,
    /// Unified diff of the narrative text.
    pub patch: String,
    pub edited_text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum ChangeProposal {
    /// Nothing to publish.
    UpToDate(SyncReport),
    Changes(ChangeSet),
}

impl ChangeProposal {
    pub fn report(&self) -> &SyncReport {
        match self {
            Self::UpToDate(report) => report,
            Self::Changes(set) => &set.report,
        }
    }

    pub fn is_up_to_date(&self) -> bool {
        matches!(self, Self::UpToDate(_))
    }
}

/// Package an edit outcome. `report` arrives with the run-level fields filled
/// in; the summary and unplaced topics are added here.
#[instrument(skip_all, fields(applied = outcome.applied.len()))]
pub fn publish(
    original: &NarrativeDocument,
    outcome: &EditOutcome,
    mut report: SyncReport,
) -> ChangeProposal {
    report.summary = outcome.applied.iter().map(SummaryEntry::from).collect();
    report.unplaced = outcome.unplaced.clone();
    report.up_to_date = outcome.applied.is_empty() && outcome.unplaced.is_empty();

    if outcome.applied.is_empty() {
        info!(unplaced = report.unplaced.len(), "narrative up to date; nothing to publish");
        return ChangeProposal::UpToDate(report);
    }

    let section_changes = section_changes(original, &outcome.document);
    let original_text = original.render();
    let edited_text = outcome.document.render();
    let patch = unified_patch(&original_text, &edited_text);

    info!(
        sections_changed = section_changes.len(),
        patch_len = patch.len(),
        "change set ready"
    );

    ChangeProposal::Changes(ChangeSet {
        report,
        section_changes,
        patch,
        edited_text,
    })
}

/// Sections added or extended in `edited`, matched to `original` by id.
pub fn section_changes(
    original: &NarrativeDocument,
    edited: &NarrativeDocument,
) -> Vec<SectionChange> {
    let before: HashMap<&str, _> = original
        .sections
        .iter()
        .map(|s| (s.id.as_str(), s))
        .collect();

    edited
        .sections
        .iter()
        .filter_map(|section| {
            let change = match before.get(section.id.as_str()) {
                None => ChangeKind::Added,
                Some(old)
                    if old.heading != section.heading
                        || old.body.trim_end() != section.body.trim_end() =>
                {
                    ChangeKind::Extended
                }
                Some(_) => return None,
            };
            Some(SectionChange {
                section_id: section.id.clone(),
                title: section.title.clone(),
                stage: section.stage,
                change,
                position: section.position,
            })
        })
        .collect()
}

/// Unified diff with three lines of context.
pub fn unified_patch(original: &str, edited: &str) -> String {
    TextDiff::from_lines(original, edited)
        .unified_diff()
        .context_radius(3)
        .header("a/narrative", "b/narrative")
        .to_string()
}

#[cfg(test)]
mod tests {
    use docsync_shared::{FetchError, Placement, Topic};

    use super::*;
    use crate::editor::{TemplateSynthesizer, apply, build_plan};
    use crate::narrative::parse_narrative;
    use crate::vocabulary::Vocabulary;

    const TUTORIAL: &str = "# Agent Tutorial\n\n## Setup\n\nInstall it.\n\n## Remembering Things\n\nMemory.\n\n## Calling Tools\n\nTools.\n";

    fn gap(title: &str, stage: Stage, placement: Placement) -> Gap {
        Gap {
            topic: Topic {
                key: TopicKey(title.to_lowercase()),
                title: title.into(),
                description: Some("Details.".into()),
                origin: None,
            },
            candidate_stage: stage,
            placement,
            score: 0.4,
            rationale: format!("{title} fits here"),
        }
    }

    fn edit(gaps: &[Gap]) -> (NarrativeDocument, EditOutcome) {
        let doc = parse_narrative(TUTORIAL, &Vocabulary::builtin()).unwrap();
        let plan = build_plan(&doc, gaps, &TemplateSynthesizer);
        let outcome = apply(&doc, &plan).unwrap();
        (doc, outcome)
    }

    fn sample_gaps() -> Vec<Gap> {
        vec![
            gap(
                "Durable sessions",
                Stage::Stateful,
                Placement::Extend {
                    section_id: "remembering-things".into(),
                },
            ),
            gap(
                "Multi-agent orchestration",
                Stage::Production,
                Placement::Insert {
                    after: Some("calling-tools".into()),
                },
            ),
        ]
    }

    #[test]
    fn empty_outcome_is_up_to_date() {
        let (doc, outcome) = edit(&[]);
        let proposal = publish(&doc, &outcome, SyncReport::new("https://docs.example.com/"));

        assert!(proposal.is_up_to_date());
        assert!(proposal.report().up_to_date);
        assert!(proposal.report().to_markdown().contains("No changes needed."));
    }

    #[test]
    fn unplaced_only_report_is_not_up_to_date() {
        let orphan = gap(
            "Orphan",
            Stage::Stateful,
            Placement::Extend {
                section_id: "no-such-section".into(),
            },
        );
        let (doc, outcome) = edit(&[orphan]);
        let proposal = publish(&doc, &outcome, SyncReport::new("https://docs.example.com/"));

        assert!(proposal.is_up_to_date());
        assert!(!proposal.report().up_to_date);
        let md = proposal.report().to_markdown();
        assert!(!md.contains("## Up to date"));
        assert!(!md.contains("No changes needed."));
        assert!(md.contains("## No changes applied"));
        assert!(md.contains("## Unplaced topics"));
        assert!(md.contains("- **Orphan** (stateful): target `no-such-section` not found"));
    }

    #[test]
    fn structural_diff_lists_extended_and_added_sections() {
        let (doc, outcome) = edit(&sample_gaps());
        let changes = section_changes(&doc, &outcome.document);

        assert_eq!(
            changes,
            vec![
                SectionChange {
                    section_id: "remembering-things".into(),
                    title: "Remembering Things".into(),
                    stage: Stage::Stateful,
                    change: ChangeKind::Extended,
                    position: 1,
                },
                SectionChange {
                    section_id: "multi-agent-orchestration".into(),
                    title: "Multi-agent orchestration".into(),
                    stage: Stage::Production,
                    change: ChangeKind::Added,
                    position: 3,
                },
            ]
        );
    }

    #[test]
    fn spacing_only_changes_are_not_reported() {
        // Calling Tools gains a trailing blank line when a section follows it.
        let (doc, outcome) = edit(&sample_gaps()[1..]);
        let changes = section_changes(&doc, &outcome.document);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change, ChangeKind::Added);
    }

    #[test]
    fn changes_carry_patch_summary_and_text() {
        let (doc, outcome) = edit(&sample_gaps());
        let proposal = publish(&doc, &outcome, SyncReport::new("https://docs.example.com/"));

        let ChangeProposal::Changes(set) = proposal else {
            panic!("expected changes");
        };
        assert!(set.patch.starts_with("--- a/narrative\n+++ b/narrative\n"));
        assert!(set.patch.contains("+### Durable sessions\n"));
        assert!(set.patch.contains("+## Multi-agent orchestration\n"));
        assert_eq!(set.edited_text, outcome.document.render());

        let summary = &set.report.summary;
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].insertion, EditKind::Extend);
        assert_eq!(summary[0].target_stage, Stage::Stateful);
        assert_eq!(summary[1].insertion, EditKind::Insert);
        assert_eq!(summary[1].target_stage, Stage::Production);
        assert!(!set.report.up_to_date);
    }

    #[test]
    fn markdown_report_lists_everything_for_review() {
        let (doc, outcome) = edit(&sample_gaps());
        let mut report = SyncReport::new("https://docs.example.com/");
        report.pages_fetched = 3;
        report.omissions.push(Omission {
            page_id: "guide/broken".into(),
            error: FetchError::Status {
                url: "https://docs.example.com/guide/broken".into(),
                status: 500,
            },
        });
        report.warnings.push(PlanningAmbiguityWarning {
            topic: TopicKey("multi agent orchestration".into()),
            title: "Multi-agent orchestration".into(),
            best_section: Some("calling-tools".into()),
            best_score: 0.05,
            threshold: 0.25,
        });

        let markdown = publish(&doc, &outcome, report).report().to_markdown();
        assert!(markdown.contains("- Pages: 3 fetched, 1 omitted"));
        assert!(markdown.contains("| Durable sessions | stateful | extend | `remembering-things` |"));
        assert!(markdown.contains("| Multi-agent orchestration | production | new section | `multi-agent-orchestration` |"));
        assert!(markdown.contains("## Needs review"));
        assert!(markdown.contains("- `guide/broken`: https://docs.example.com/guide/broken: HTTP 500"));
    }

    #[test]
    fn proposal_serializes_with_status_tag() {
        let (doc, outcome) = edit(&[]);
        let proposal = publish(&doc, &outcome, SyncReport::new("https://docs.example.com/"));
        let json = serde_json::to_value(&proposal).unwrap();
        assert_eq!(json["status"], "up-to-date");
        assert_eq!(json["root"], "https://docs.example.com/");
    }
}
