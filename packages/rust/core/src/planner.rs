//! Gap planner: decide where each missing topic belongs.
//!
//! Every section is scored against a gap topic with
//!
//! ```text
//! score = Σ idf(t ∈ topic ∩ section) / Σ idf(t ∈ topic) × 1 / (1 + penalty × stage distance)
//! idf(t) = ln(1 + (N + 1) / (df(t) + 1))
//! ```
//!
//! over the N sections. The best section at or above the affinity threshold
//! is extended; otherwise a new section is inserted after the last section
//! whose stage does not exceed the topic's stage. Equal scores go to the
//! later section.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use docsync_shared::{
    Gap, NarrativeDocument, Placement, PlannerConfig, PlanningAmbiguityWarning, Stage, Topic,
    TopicSet,
};

use crate::topics::TopicIndexer;

/// Gaps plus the low-confidence placements among them.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlanOutcome {
    pub gaps: Vec<Gap>,
    pub warnings: Vec<PlanningAmbiguityWarning>,
}

impl PlanOutcome {
    pub fn is_empty(&self) -> bool {
        self.gaps.is_empty()
    }
}

/// Token statistics for the sections of one document.
struct SectionProfiles {
    tokens: Vec<HashSet<String>>,
    df: HashMap<String, usize>,
}

impl SectionProfiles {
    fn build(doc: &NarrativeDocument, indexer: &TopicIndexer) -> Self {
        let tokens: Vec<HashSet<String>> = doc
            .sections
            .iter()
            .map(|s| {
                indexer
                    .affinity_tokens(&format!("{}\n{}", s.title, s.body))
                    .into_iter()
                    .collect()
            })
            .collect();

        let mut df = HashMap::new();
        for set in &tokens {
            for token in set {
                *df.entry(token.clone()).or_insert(0) += 1;
            }
        }
        Self { tokens, df }
    }

    fn idf(&self, token: &str) -> f64 {
        let n = self.tokens.len() as f64;
        let df = self.df.get(token).copied().unwrap_or(0) as f64;
        (1.0 + (n + 1.0) / (df + 1.0)).ln()
    }
}

/// Plans one [`Gap`] per topic missing from the narrative.
pub struct GapPlanner<'a> {
    indexer: &'a TopicIndexer,
    config: &'a PlannerConfig,
}

impl<'a> GapPlanner<'a> {
    pub fn new(indexer: &'a TopicIndexer, config: &'a PlannerConfig) -> Self {
        Self { indexer, config }
    }

    /// `external − narrative`, each gap placed against `doc`.
    ///
    /// An empty outcome is the normal "already up to date" result.
    #[instrument(skip_all, fields(external = external.len(), narrative = narrative.len()))]
    pub fn plan(
        &self,
        external: &TopicSet,
        narrative: &TopicSet,
        doc: &NarrativeDocument,
    ) -> PlanOutcome {
        let profiles = SectionProfiles::build(doc, self.indexer);
        let mut outcome = PlanOutcome::default();

        for topic in external.difference(narrative) {
            let (gap, warning) = self.place(topic, doc, &profiles);
            debug!(
                topic = %topic.key,
                stage = %gap.candidate_stage,
                target = gap.target_section_id().unwrap_or("<start>"),
                score = gap.score,
                "gap placed"
            );
            if let Some(warning) = warning {
                warn!(
                    topic = %warning.topic,
                    best_score = warning.best_score,
                    "placement below affinity threshold"
                );
                outcome.warnings.push(warning);
            }
            outcome.gaps.push(gap);
        }

        info!(
            gaps = outcome.gaps.len(),
            warnings = outcome.warnings.len(),
            "planning complete"
        );
        outcome
    }

    fn place(
        &self,
        topic: &Topic,
        doc: &NarrativeDocument,
        profiles: &SectionProfiles,
    ) -> (Gap, Option<PlanningAmbiguityWarning>) {
        let topic_text = match &topic.description {
            Some(description) => format!("{}\n{description}", topic.title),
            None => topic.title.clone(),
        };
        let topic_tokens: HashSet<String> =
            self.indexer.affinity_tokens(&topic_text).into_iter().collect();
        let classified = self.indexer.vocabulary().classify(&topic_text);

        let total: f64 = topic_tokens.iter().map(|t| profiles.idf(t)).sum();

        let mut best: Option<(usize, f64)> = None;
        for (index, section) in doc.sections.iter().enumerate() {
            let affinity = if total > 0.0 {
                topic_tokens
                    .intersection(&profiles.tokens[index])
                    .map(|t| profiles.idf(t))
                    .sum::<f64>()
                    / total
            } else {
                0.0
            };
            let weight = classified.map_or(1.0, |stage| {
                1.0 / (1.0 + self.config.stage_penalty * section.stage.distance(stage) as f64)
            });
            let score = affinity * weight;

            debug!(topic = %topic.key, section = %section.id, affinity, weight, score, "section scored");

            if best.is_none_or(|(_, best_score)| score >= best_score) {
                best = Some((index, score));
            }
        }

        let best_score = best.map_or(0.0, |(_, score)| score);
        let best_section = best.map(|(index, _)| &doc.sections[index]);
        let threshold = self.config.affinity_threshold;

        let candidate_stage = classified
            .or_else(|| best_section.filter(|_| best_score > 0.0).map(|s| s.stage))
            .or_else(|| doc.last_stage())
            .unwrap_or(Stage::Basic);

        if let Some(section) = best_section.filter(|_| best_score >= threshold && best_score > 0.0) {
            let gap = Gap {
                topic: topic.clone(),
                candidate_stage,
                placement: Placement::Extend {
                    section_id: section.id.clone(),
                },
                score: best_score,
                rationale: format!(
                    "'{}' best matches '{}' ({} stage) with affinity {best_score:.2} (threshold {threshold:.2}); extending that section",
                    topic.title, section.title, section.stage
                ),
            };
            return (gap, None);
        }

        let anchor = doc
            .sections
            .iter()
            .rev()
            .find(|s| s.stage <= candidate_stage);
        let rationale = match (best_section.filter(|_| best_score > 0.0), anchor) {
            (Some(closest), Some(anchor)) => format!(
                "no section reached affinity {threshold:.2} (closest '{}' at {best_score:.2}); new {candidate_stage} section after '{}'",
                closest.title, anchor.title
            ),
            (None, Some(anchor)) => format!(
                "no section shares vocabulary with '{}'; new {candidate_stage} section after '{}'",
                topic.title, anchor.title
            ),
            (_, None) => format!(
                "no section precedes the {candidate_stage} stage; new section at the start of the document"
            ),
        };

        let warning = best_section
            .filter(|_| best_score > 0.0)
            .map(|closest| PlanningAmbiguityWarning {
                topic: topic.key.clone(),
                title: topic.title.clone(),
                best_section: Some(closest.id.clone()),
                best_score,
                threshold,
            });

        let gap = Gap {
            topic: topic.clone(),
            candidate_stage,
            placement: Placement::Insert {
                after: anchor.map(|s| s.id.clone()),
            },
            score: best_score,
            rationale,
        };
        (gap, warning)
    }
}
