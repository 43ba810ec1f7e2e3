//! Core domain types for documentation synchronization runs.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DocSyncError, FetchError, Result};

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one synchronization run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// A tier in the tutorial's progression. Declaration order is narrative order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Basic,
    Stateful,
    ToolUsing,
    Production,
}

impl Stage {
    /// All stages in narrative order.
    pub const ALL: [Stage; 4] = [
        Stage::Basic,
        Stage::Stateful,
        Stage::ToolUsing,
        Stage::Production,
    ];

    /// Zero-based rank in the progression.
    pub fn rank(self) -> usize {
        self as usize
    }

    /// Number of tiers between two stages.
    pub fn distance(self, other: Stage) -> usize {
        self.rank().abs_diff(other.rank())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Basic => "basic",
            Stage::Stateful => "stateful",
            Stage::ToolUsing => "tool-using",
            Stage::Production => "production",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = DocSyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace(['_', ' '], "-").as_str() {
            "basic" => Ok(Stage::Basic),
            "stateful" => Ok(Stage::Stateful),
            "tool-using" | "tools" => Ok(Stage::ToolUsing),
            "production" => Ok(Stage::Production),
            other => Err(DocSyncError::config(format!("unknown stage '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Topics
// ---------------------------------------------------------------------------

/// Normalized topic identifier (lowercase, punctuation-free, synonym-folded).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopicKey(pub String);

impl TopicKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TopicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A subject covered by a documentation page or a narrative section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub key: TopicKey,
    /// Heading text as written by the author.
    pub title: String,
    /// Lead paragraph under the heading, when one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Source URL (external topics) or section id (narrative topics).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

/// Topics keyed by normalized key. Iteration order is key order.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct TopicSet(BTreeMap<TopicKey, Topic>);

impl TopicSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a topic. The first topic seen for a key wins; returns `false` for duplicates.
    pub fn insert(&mut self, topic: Topic) -> bool {
        if self.0.contains_key(&topic.key) {
            return false;
        }
        self.0.insert(topic.key.clone(), topic);
        true
    }

    pub fn contains(&self, key: &TopicKey) -> bool {
        self.0.contains_key(key)
    }

    pub fn get(&self, key: &TopicKey) -> Option<&Topic> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Topic> {
        self.0.values()
    }

    /// Topics in `self` whose key is absent from `other`.
    pub fn difference<'a>(&'a self, other: &'a TopicSet) -> impl Iterator<Item = &'a Topic> + 'a {
        self.0
            .iter()
            .filter(|(key, _)| !other.contains(key))
            .map(|(_, topic)| topic)
    }

    pub fn is_subset(&self, other: &TopicSet) -> bool {
        self.0.keys().all(|key| other.contains(key))
    }
}

impl FromIterator<Topic> for TopicSet {
    fn from_iter<I: IntoIterator<Item = Topic>>(iter: I) -> Self {
        let mut set = TopicSet::new();
        for topic in iter {
            set.insert(topic);
        }
        set
    }
}

// ---------------------------------------------------------------------------
// Narrative
// ---------------------------------------------------------------------------

/// One heading-delimited section of the tutorial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeSection {
    /// Stable slug, unique within the document.
    pub id: String,
    pub stage: Stage,
    /// Cleaned heading text.
    pub title: String,
    /// Heading level (1–6).
    pub level: u8,
    /// Raw heading line(s) exactly as they appear in the document.
    pub heading: String,
    /// Raw body text up to the next section heading.
    pub body: String,
    pub position: usize,
}

/// The tutorial as an arena of sections indexed by position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeDocument {
    /// Text before the first section (front matter, document title, intro).
    pub preamble: String,
    pub sections: Vec<NarrativeSection>,
}

impl NarrativeDocument {
    /// Look up a section by id.
    pub fn section(&self, id: &str) -> Option<&NarrativeSection> {
        self.sections.iter().find(|s| s.id == id)
    }

    /// Heading level used for top-level sections.
    pub fn section_level(&self) -> u8 {
        self.sections.first().map_or(2, |s| s.level)
    }

    /// Stage of the last section.
    pub fn last_stage(&self) -> Option<Stage> {
        self.sections.last().map(|s| s.stage)
    }

    /// Reassemble the document text.
    pub fn render(&self) -> String {
        let mut out = self.preamble.clone();
        for section in &self.sections {
            out.push_str(&section.heading);
            out.push_str(&section.body);
        }
        out
    }

    /// Check the arena invariants: contiguous positions, non-decreasing
    /// stages, and unique section ids.
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        let mut previous: Option<Stage> = None;

        for (index, section) in self.sections.iter().enumerate() {
            if section.position != index {
                return Err(DocSyncError::apply(format!(
                    "section '{}' has position {} but sits at index {index}",
                    section.id, section.position
                )));
            }
            if let Some(prev) = previous {
                if section.stage < prev {
                    return Err(DocSyncError::apply(format!(
                        "stage regresses from {prev} to {} at section '{}'",
                        section.stage, section.id
                    )));
                }
            }
            if !seen.insert(section.id.as_str()) {
                return Err(DocSyncError::apply(format!(
                    "duplicate section id '{}'",
                    section.id
                )));
            }
            previous = Some(section.stage);
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Gaps
// ---------------------------------------------------------------------------

/// Where a missing topic will land.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum Placement {
    /// Append to the body of an existing section.
    Extend { section_id: String },
    /// Create a new section after `after` (or at the document start when `None`).
    Insert { after: Option<String> },
}

/// A topic present upstream but absent from the narrative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gap {
    pub topic: Topic,
    /// Stage the topic will belong to once placed.
    pub candidate_stage: Stage,
    pub placement: Placement,
    /// Best affinity score observed across sections.
    pub score: f64,
    pub rationale: String,
}

impl Gap {
    /// The section that is extended, or the one a new section follows.
    pub fn target_section_id(&self) -> Option<&str> {
        match &self.placement {
            Placement::Extend { section_id } => Some(section_id),
            Placement::Insert { after } => after.as_deref(),
        }
    }
}

/// Low-confidence placement flagged for human review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanningAmbiguityWarning {
    pub topic: TopicKey,
    pub title: String,
    /// Closest section, even though it missed the threshold.
    pub best_section: Option<String>,
    pub best_score: f64,
    pub threshold: f64,
}

// ---------------------------------------------------------------------------
// Corpus
// ---------------------------------------------------------------------------

/// A heading in a fetched page's outline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlineHeading {
    pub level: u8,
    pub text: String,
    /// First paragraph under the heading, as plain text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead: Option<String>,
}

/// One fetched reference page, normalized to Markdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusPage {
    /// Path slug derived from the canonical URL (e.g. `guide/tools`).
    pub id: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub markdown: String,
    pub headings: Vec<OutlineHeading>,
    /// SHA-256 of the response body.
    pub content_hash: String,
}

/// A page the fetcher had to leave out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Omission {
    pub page_id: String,
    pub error: FetchError,
}

/// Everything fetched during one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Corpus {
    pub root: String,
    pub pages: BTreeMap<String, CorpusPage>,
    pub omissions: Vec<Omission>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(id: &str, stage: Stage, position: usize) -> NarrativeSection {
        NarrativeSection {
            id: id.into(),
            stage,
            title: id.into(),
            level: 2,
            heading: format!("## {id}\n"),
            body: "\nText.\n\n".into(),
            position,
        }
    }

    fn topic(key: &str) -> Topic {
        Topic {
            key: TopicKey(key.into()),
            title: key.into(),
            description: None,
            origin: None,
        }
    }

    #[test]
    fn stage_order_follows_progression() {
        assert!(Stage::Basic < Stage::Stateful);
        assert!(Stage::ToolUsing < Stage::Production);
        assert_eq!(Stage::Basic.distance(Stage::Production), 3);
        assert_eq!(Stage::ToolUsing.distance(Stage::Stateful), 1);
    }

    #[test]
    fn stage_parses_and_serializes_kebab_case() {
        assert_eq!("tool-using".parse::<Stage>().unwrap(), Stage::ToolUsing);
        assert_eq!("Tool_Using".parse::<Stage>().unwrap(), Stage::ToolUsing);
        assert!("advanced".parse::<Stage>().is_err());

        let json = serde_json::to_string(&Stage::ToolUsing).expect("serialize");
        assert_eq!(json, "\"tool-using\"");
    }

    #[test]
    fn topic_set_keeps_first_and_diffs_by_key() {
        let mut external = TopicSet::new();
        assert!(external.insert(topic("tools")));
        assert!(!external.insert(topic("tools")));
        external.insert(topic("persistence"));

        let narrative: TopicSet = [topic("tools")].into_iter().collect();
        let missing: Vec<&str> = external
            .difference(&narrative)
            .map(|t| t.key.as_str())
            .collect();
        assert_eq!(missing, vec!["persistence"]);
        assert!(narrative.is_subset(&external));
        assert!(!external.is_subset(&narrative));
    }

    #[test]
    fn document_renders_preamble_then_sections() {
        let doc = NarrativeDocument {
            preamble: "# Tutorial\n\n".into(),
            sections: vec![section("setup", Stage::Basic, 0)],
        };
        assert_eq!(doc.render(), "# Tutorial\n\n## setup\n\nText.\n\n");
        assert_eq!(doc.section_level(), 2);
    }

    #[test]
    fn validate_rejects_stage_regression() {
        let doc = NarrativeDocument {
            preamble: String::new(),
            sections: vec![
                section("tools", Stage::ToolUsing, 0),
                section("setup", Stage::Basic, 1),
            ],
        };
        let err = doc.validate().unwrap_err();
        assert!(err.to_string().contains("stage regresses"));
    }

    #[test]
    fn validate_rejects_gapped_positions_and_duplicate_ids() {
        let gapped = NarrativeDocument {
            preamble: String::new(),
            sections: vec![section("a", Stage::Basic, 0), section("b", Stage::Basic, 2)],
        };
        assert!(gapped.validate().is_err());

        let duplicate = NarrativeDocument {
            preamble: String::new(),
            sections: vec![section("a", Stage::Basic, 0), section("a", Stage::Basic, 1)],
        };
        assert!(duplicate.validate().unwrap_err().to_string().contains("duplicate"));
    }

    #[test]
    fn gap_reports_target_section() {
        let gap = Gap {
            topic: topic("persistence"),
            candidate_stage: Stage::Stateful,
            placement: Placement::Insert { after: None },
            score: 0.0,
            rationale: String::new(),
        };
        assert_eq!(gap.target_section_id(), None);
    }
}
