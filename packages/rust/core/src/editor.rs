//! Narrative editor: synthesize content for each gap and splice it in.
//!
//! Applying a plan never mutates the input. A new section arena is built,
//! positions are renumbered, and the result is validated before it is
//! returned, so a half-applied document is never observable.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use docsync_shared::{
    DocSyncError, Gap, NarrativeDocument, NarrativeSection, Placement, Result, Stage, Topic,
};

use crate::narrative::{slugify, unique_id};

// ---------------------------------------------------------------------------
// Content synthesis
// ---------------------------------------------------------------------------

/// Synthesized text for one edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentBlock {
    /// Heading line for a new section; `None` for an extension block.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,
    pub body: String,
}

/// Writes the text that closes a gap.
///
/// Whatever an implementation writes must include a heading carrying the
/// topic title, otherwise the next run will see the same gap again.
pub trait ContentSynthesizer: Send + Sync {
    /// Block appended to `section`'s body. Its heading goes at `sub_level`;
    /// when that is `None` a heading would re-split the document, and a
    /// standalone bold line carrying the title takes its place.
    fn extension(
        &self,
        topic: &Topic,
        section: &NarrativeSection,
        sub_level: Option<u8>,
    ) -> ContentBlock;

    /// A complete new section with its heading at `level`.
    fn section(&self, topic: &Topic, level: u8) -> ContentBlock;
}

/// Default synthesizer: heading, the topic's description, and a reference link.
pub struct TemplateSynthesizer;

impl TemplateSynthesizer {
    fn prose(topic: &Topic) -> String {
        let mut text = topic
            .description
            .clone()
            .unwrap_or_else(|| format!("{} is covered in the reference documentation.", topic.title));
        if let Some(origin) = &topic.origin {
            text.push_str(&format!("\n\nReference: [{}]({origin})", topic.title));
        }
        text
    }
}

impl ContentSynthesizer for TemplateSynthesizer {
    fn extension(
        &self,
        topic: &Topic,
        _section: &NarrativeSection,
        sub_level: Option<u8>,
    ) -> ContentBlock {
        let lead = match sub_level {
            Some(level) => format!("{} {}", "#".repeat(usize::from(level)), topic.title),
            None => format!("**{}**", topic.title),
        };
        ContentBlock {
            heading: None,
            body: format!("{lead}\n\n{}\n", Self::prose(topic)),
        }
    }

    fn section(&self, topic: &Topic, level: u8) -> ContentBlock {
        ContentBlock {
            heading: Some(format!("{} {}\n", "#".repeat(level.clamp(1, 6) as usize), topic.title)),
            body: format!("\n{}\n", Self::prose(topic)),
        }
    }
}

// ---------------------------------------------------------------------------
// Edit plan
// ---------------------------------------------------------------------------

/// Whether an edit grows an existing section or adds a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EditKind {
    Extend,
    Insert,
}

/// One planned edit.
#[derive(Debug, Clone, Serialize)]
pub struct EditOp {
    pub gap: Gap,
    pub kind: EditKind,
    pub content: ContentBlock,
}

/// Edits in application order: anchor position, then stage, then topic key.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EditPlan {
    pub ops: Vec<EditOp>,
}

impl EditPlan {
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }
}

/// Synthesize content for every gap and order the resulting ops.
#[instrument(skip_all, fields(gaps = gaps.len()))]
pub fn build_plan(
    doc: &NarrativeDocument,
    gaps: &[Gap],
    synthesizer: &dyn ContentSynthesizer,
) -> EditPlan {
    let level = doc.section_level();

    let mut keyed: Vec<((usize, Stage, String), EditOp)> = gaps
        .iter()
        .map(|gap| {
            let (kind, content, slot) = match &gap.placement {
                Placement::Extend { section_id } => match doc.section(section_id) {
                    Some(section) => (
                        EditKind::Extend,
                        synthesizer.extension(&gap.topic, section, sub_level(doc, section)),
                        section.position + 1,
                    ),
                    None => (
                        EditKind::Extend,
                        synthesizer.section(&gap.topic, level + 1),
                        usize::MAX,
                    ),
                },
                Placement::Insert { after } => {
                    let slot = match after {
                        None => 0,
                        Some(id) => doc.section(id).map_or(usize::MAX, |s| s.position + 1),
                    };
                    (EditKind::Insert, synthesizer.section(&gap.topic, level), slot)
                }
            };
            let key = (slot, gap.candidate_stage, gap.topic.key.as_str().to_string());
            (
                key,
                EditOp {
                    gap: gap.clone(),
                    kind,
                    content,
                },
            )
        })
        .collect();

    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    EditPlan {
        ops: keyed.into_iter().map(|(_, op)| op).collect(),
    }
}

/// Heading level for a block appended to `section`, if a heading is safe there.
fn sub_level(doc: &NarrativeDocument, section: &NarrativeSection) -> Option<u8> {
    // A lone H1 followed by a deeper heading parses as the document title.
    let lone_h1 = section.level == 1 && doc.sections.len() == 1;
    (section.level < 6 && !lone_h1).then_some(section.level + 1)
}

// ---------------------------------------------------------------------------
// Application
// ---------------------------------------------------------------------------

/// A gap that made it into the document.
#[derive(Debug, Clone, Serialize)]
pub struct AppliedEdit {
    pub topic: Topic,
    pub kind: EditKind,
    /// The extended section, or the id of the new section.
    pub section_id: String,
    /// Stage of the section that now holds the topic.
    pub stage: Stage,
    pub score: f64,
    pub rationale: String,
}

/// The edited document plus what was and was not placed.
#[derive(Debug, Clone)]
pub struct EditOutcome {
    pub document: NarrativeDocument,
    pub applied: Vec<AppliedEdit>,
    /// Gaps whose target section does not exist. Reported, never dropped.
    pub unplaced: Vec<Gap>,
}

/// Apply `plan` to `doc`, returning a new document.
///
/// Fails with [`DocSyncError::Apply`] when the result breaks the document
/// invariants; that always means the plan itself was wrong.
#[instrument(skip_all, fields(ops = plan.len(), sections = doc.sections.len()))]
pub fn apply(doc: &NarrativeDocument, plan: &EditPlan) -> Result<EditOutcome> {
    let mut at_start: Vec<&EditOp> = Vec::new();
    let mut extends: HashMap<&str, Vec<&EditOp>> = HashMap::new();
    let mut inserts: HashMap<&str, Vec<&EditOp>> = HashMap::new();
    let mut unplaced = Vec::new();

    for op in &plan.ops {
        let (bucket, target) = match (&op.gap.placement, op.kind) {
            (Placement::Extend { section_id }, EditKind::Extend) => (&mut extends, section_id),
            (Placement::Insert { after: None }, EditKind::Insert) => {
                at_start.push(op);
                continue;
            }
            (Placement::Insert { after: Some(id) }, EditKind::Insert) => (&mut inserts, id),
            _ => {
                return Err(DocSyncError::apply(format!(
                    "edit for '{}' does not match its placement",
                    op.gap.topic.key
                )));
            }
        };
        match doc.section(target) {
            Some(section) => bucket.entry(section.id.as_str()).or_default().push(op),
            None => {
                warn!(topic = %op.gap.topic.key, target = %target, "target section missing; topic unplaced");
                unplaced.push(op.gap.clone());
            }
        }
    }

    let mut taken: HashSet<String> = doc.sections.iter().map(|s| s.id.clone()).collect();
    let mut preamble = doc.preamble.clone();
    let mut sections: Vec<NarrativeSection> = Vec::with_capacity(doc.sections.len() + plan.len());
    let mut touched: Vec<bool> = Vec::with_capacity(sections.capacity());
    let mut applied = Vec::new();

    for op in at_start {
        let section = new_section(op, &mut taken)?;
        applied.push(applied_edit(op, &section));
        sections.push(section);
        touched.push(true);
    }

    for original in &doc.sections {
        let mut section = original.clone();
        let mut changed = false;
        if let Some(ops) = extends.get(original.id.as_str()) {
            for op in ops {
                section.body = extend_body(&section.body, &op.content.body);
                applied.push(applied_edit(op, &section));
                changed = true;
            }
        }
        sections.push(section);
        touched.push(changed);

        if let Some(ops) = inserts.get(original.id.as_str()) {
            for op in ops {
                let section = new_section(op, &mut taken)?;
                applied.push(applied_edit(op, &section));
                sections.push(section);
                touched.push(true);
            }
        }
    }

    // Keep one blank line between a touched section and its neighbours.
    for i in 0..sections.len().saturating_sub(1) {
        if touched[i] || touched[i + 1] {
            ensure_blank_line(&mut sections[i].body);
        }
    }
    if touched.first().copied().unwrap_or(false) {
        ensure_blank_line(&mut preamble);
    }

    for (position, section) in sections.iter_mut().enumerate() {
        section.position = position;
    }

    let document = NarrativeDocument { preamble, sections };
    document.validate()?;

    info!(
        applied = applied.len(),
        unplaced = unplaced.len(),
        sections = document.sections.len(),
        "edit plan applied"
    );

    Ok(EditOutcome {
        document,
        applied,
        unplaced,
    })
}

fn new_section(op: &EditOp, taken: &mut HashSet<String>) -> Result<NarrativeSection> {
    let heading = op.content.heading.clone().ok_or_else(|| {
        DocSyncError::apply(format!("insert for '{}' has no heading", op.gap.topic.key))
    })?;
    let level = heading.chars().take_while(|c| *c == '#').count() as u8;
    let id = unique_id(&slugify(&op.gap.topic.title), taken);
    debug!(%id, stage = %op.gap.candidate_stage, "new section");

    Ok(NarrativeSection {
        id,
        stage: op.gap.candidate_stage,
        title: op.gap.topic.title.clone(),
        level,
        heading,
        body: op.content.body.clone(),
        position: 0,
    })
}

fn applied_edit(op: &EditOp, section: &NarrativeSection) -> AppliedEdit {
    AppliedEdit {
        topic: op.gap.topic.clone(),
        kind: op.kind,
        section_id: section.id.clone(),
        stage: section.stage,
        score: op.gap.score,
        rationale: op.gap.rationale.clone(),
    }
}

/// Append `block` after the existing prose, separated by one blank line.
fn extend_body(body: &str, block: &str) -> String {
    let trimmed = body.trim_end();
    let mut out = String::with_capacity(trimmed.len() + block.len() + 3);
    if trimmed.is_empty() {
        out.push('\n');
    } else {
        out.push_str(trimmed);
        out.push_str("\n\n");
    }
    out.push_str(block.trim_end());
    out.push('\n');
    out
}

fn ensure_blank_line(text: &mut String) {
    if text.is_empty() {
        return;
    }
    if !text.ends_with('\n') {
        text.push('\n');
    }
    if !text.ends_with("\n\n") {
        text.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use docsync_shared::TopicKey;

    use super::*;
    use crate::narrative::parse_narrative;
    use crate::topics::TopicIndexer;
    use crate::vocabulary::Vocabulary;

    const TUTORIAL: &str = "# Agent Tutorial\n\nIntro.\n\n## Setup\n\nInstall it.\n\n## Remembering Things\n\nMemory.\n\n## Calling Tools\n\nTools.\n";

    fn doc() -> NarrativeDocument {
        parse_narrative(TUTORIAL, &Vocabulary::builtin()).unwrap()
    }

    fn gap(title: &str, stage: Stage, placement: Placement) -> Gap {
        Gap {
            topic: Topic {
                key: TopicKey(title.to_lowercase()),
                title: title.into(),
                description: Some(format!("About {title}.")),
                origin: Some("https://docs.example.com/ref".into()),
            },
            candidate_stage: stage,
            placement,
            score: 0.5,
            rationale: "test".into(),
        }
    }

    fn extend(id: &str) -> Placement {
        Placement::Extend {
            section_id: id.into(),
        }
    }

    fn after(id: Option<&str>) -> Placement {
        Placement::Insert {
            after: id.map(str::to_string),
        }
    }

    fn run(doc: &NarrativeDocument, gaps: &[Gap]) -> EditOutcome {
        let plan = build_plan(doc, gaps, &TemplateSynthesizer);
        apply(doc, &plan).unwrap()
    }

    #[test]
    fn extend_appends_sub_section_and_leaves_others_alone() {
        let doc = doc();
        let outcome = run(&doc, &[gap("Checkpointing", Stage::Stateful, extend("remembering-things"))]);

        let edited = &outcome.document;
        assert_eq!(edited.sections.len(), 3);
        assert_eq!(
            edited.sections[1].body,
            "\nMemory.\n\n### Checkpointing\n\nAbout Checkpointing.\n\nReference: [Checkpointing](https://docs.example.com/ref)\n\n"
        );
        assert_eq!(edited.sections[0], doc.sections[0]);
        assert_eq!(edited.sections[2], doc.sections[2]);
        assert_eq!(outcome.applied[0].kind, EditKind::Extend);
        assert_eq!(outcome.applied[0].stage, Stage::Stateful);
    }

    #[test]
    fn insert_creates_trailing_section() {
        let doc = doc();
        let outcome = run(
            &doc,
            &[gap("Multi-agent orchestration", Stage::Production, after(Some("calling-tools")))],
        );

        let edited = &outcome.document;
        assert_eq!(edited.sections.len(), 4);
        let new = &edited.sections[3];
        assert_eq!(new.id, "multi-agent-orchestration");
        assert_eq!(new.position, 3);
        assert_eq!(new.stage, Stage::Production);
        assert_eq!(new.heading, "## Multi-agent orchestration\n");
        assert!(edited.render().ends_with("Tools.\n\n## Multi-agent orchestration\n\nAbout Multi-agent orchestration.\n\nReference: [Multi-agent orchestration](https://docs.example.com/ref)\n"));
        edited.validate().unwrap();
    }

    #[test]
    fn insert_in_the_middle_renumbers_positions() {
        let doc = doc();
        let outcome = run(&doc, &[gap("Threads", Stage::Stateful, after(Some("remembering-things")))]);

        let ids: Vec<&str> = outcome.document.sections.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["setup", "remembering-things", "threads", "calling-tools"]);
        let positions: Vec<usize> = outcome.document.sections.iter().map(|s| s.position).collect();
        assert_eq!(positions, vec![0, 1, 2, 3]);
        assert!(outcome.document.render().contains("\n## Threads\n\nAbout Threads."));
    }

    #[test]
    fn insert_at_start_follows_preamble() {
        let doc = doc();
        let outcome = run(&doc, &[gap("Welcome", Stage::Basic, after(None))]);

        assert_eq!(outcome.document.sections[0].id, "welcome");
        assert!(outcome.document.render().starts_with("# Agent Tutorial\n\nIntro.\n\n## Welcome\n\n"));
    }

    #[test]
    fn inserts_at_same_anchor_are_ordered_by_stage_then_key() {
        let doc = doc();
        let outcome = run(
            &doc,
            &[
                gap("Zeta deploys", Stage::Production, after(Some("calling-tools"))),
                gap("Beta deploys", Stage::Production, after(Some("calling-tools"))),
                gap("Plugins", Stage::ToolUsing, after(Some("calling-tools"))),
            ],
        );
        let titles: Vec<&str> = outcome.document.sections[3..].iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Plugins", "Beta deploys", "Zeta deploys"]);
    }

    #[test]
    fn duplicate_titles_get_unique_ids() {
        let doc = doc();
        let outcome = run(&doc, &[gap("Setup", Stage::Production, after(Some("calling-tools")))]);
        assert_eq!(outcome.document.sections[3].id, "setup-2");
    }

    #[test]
    fn missing_target_is_reported_unplaced() {
        let doc = doc();
        let outcome = run(
            &doc,
            &[
                gap("Orphan", Stage::Stateful, extend("no-such-section")),
                gap("Threads", Stage::Stateful, after(Some("remembering-things"))),
            ],
        );
        assert_eq!(outcome.unplaced.len(), 1);
        assert_eq!(outcome.unplaced[0].topic.title, "Orphan");
        assert_eq!(outcome.applied.len(), 1);
    }

    #[test]
    fn stage_regression_is_an_apply_error() {
        let doc = doc();
        let plan = build_plan(&doc, &[gap("Hello", Stage::Basic, after(Some("calling-tools")))], &TemplateSynthesizer);
        let err = apply(&doc, &plan).unwrap_err();
        assert!(matches!(err, DocSyncError::Apply { .. }));
    }

    #[test]
    fn input_document_is_untouched() {
        let doc = doc();
        let snapshot = doc.clone();
        run(&doc, &[gap("Threads", Stage::Stateful, extend("remembering-things"))]);
        assert_eq!(doc, snapshot);
        assert_eq!(doc.render(), TUTORIAL);
    }

    #[test]
    fn added_content_registers_as_narrative_topics() {
        let doc = doc();
        let gaps = [
            gap("Checkpointing", Stage::Stateful, extend("remembering-things")),
            gap("Multi-agent orchestration", Stage::Production, after(Some("calling-tools"))),
        ];
        let outcome = run(&doc, &gaps);

        let vocabulary = Vocabulary::builtin();
        let reparsed = parse_narrative(&outcome.document.render(), &vocabulary).unwrap();
        let indexer = TopicIndexer::new(vocabulary, &docsync_shared::PlannerConfig::default());
        let topics = indexer.index_narrative(&reparsed);
        for gap in &gaps {
            assert!(topics.contains(&indexer.key(&gap.topic.title)), "{}", gap.topic.title);
        }
    }

    #[test]
    fn lone_h1_extension_keeps_its_section() {
        let vocabulary = Vocabulary::builtin();
        let doc = parse_narrative("# Setup\n\nInstall it.\n", &vocabulary).unwrap();
        let outcome = run(&doc, &[gap("Environment", Stage::Basic, extend("setup"))]);

        let text = outcome.document.render();
        assert!(text.contains("\n**Environment**\n\nAbout Environment."));
        let reparsed = parse_narrative(&text, &vocabulary).unwrap();
        assert_eq!(reparsed.sections.len(), 1);
        assert_eq!(reparsed.sections[0].title, "Setup");
        assert!(reparsed.preamble.is_empty());
    }

    #[test]
    fn h6_extension_uses_bold_lead_and_stays_in_section() {
        let vocabulary = Vocabulary::builtin();
        let text = "###### Setup\n\nInstall it.\n\n###### Memory\n\nState.\n";
        let doc = parse_narrative(text, &vocabulary).unwrap();
        let outcome = run(&doc, &[gap("Checkpointing", Stage::Stateful, extend("memory"))]);

        let reparsed = parse_narrative(&outcome.document.render(), &vocabulary).unwrap();
        assert_eq!(reparsed.sections.len(), 2);
        assert!(reparsed.sections[1].body.contains("**Checkpointing**\n\nAbout Checkpointing."));

        let indexer = TopicIndexer::new(vocabulary, &docsync_shared::PlannerConfig::default());
        assert!(indexer.index_narrative(&reparsed).contains(&indexer.key("Checkpointing")));
    }

    #[test]
    fn extend_body_handles_missing_trailing_newline() {
        assert_eq!(extend_body("\nText", "### A\n\nB\n"), "\nText\n\n### A\n\nB\n");
        assert_eq!(extend_body("", "### A\n"), "\n### A\n");
    }
}
