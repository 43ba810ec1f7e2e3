//! Swappable vocabulary: stage keywords and synonym folding.
//!
//! Both rule sets sit behind traits so callers can inject their own
//! classifier or folding table without touching the parser or planner.

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use tracing::debug;

use docsync_shared::{AppConfig, DocSyncError, Result, Stage, StageRuleEntry, SynonymEntry};

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Maps free text (a heading, a topic title) to a narrative stage.
pub trait StageClassifier: Send + Sync {
    /// `None` when nothing in the text points at a stage.
    fn classify(&self, text: &str) -> Option<Stage>;
}

/// Folds near-duplicate phrasings onto one canonical token sequence.
pub trait SynonymFolder: Send + Sync {
    fn fold(&self, tokens: Vec<String>) -> Vec<String>;
}

/// Lowercase, split on anything that is not a letter or digit.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

// ---------------------------------------------------------------------------
// Keyword stage classifier
// ---------------------------------------------------------------------------

const BUILTIN_STAGE_KEYWORDS: [(Stage, &[&str]); 4] = [
    (
        Stage::Basic,
        &[
            "basic", "setup", "set up", "getting started", "intro", "hello", "first",
            "quickstart", "quick start", "install",
        ],
    ),
    (
        Stage::Stateful,
        &[
            "session", "persist", "durable", "storage", "store", "memory", "remember", "state",
            "context", "thread", "conversation", "checkpoint",
        ],
    ),
    (
        Stage::ToolUsing,
        &["tool", "function call", "calling", "plugin", "action", "api call", "retriev"],
    ),
    (
        Stage::Production,
        &[
            "production", "deploy", "workflow", "orchestrat", "multi.?agent", "scal",
            "monitor", "observability", "human.in.the.loop", "evaluat",
        ],
    ),
];

/// Classifies text by counting keyword hits per stage.
///
/// Keywords are regex fragments anchored at a word start, so `orchestrat`
/// matches "orchestration" and "orchestrating". The stage with the most hits
/// wins; ties go to the later stage.
pub struct KeywordStageClassifier {
    rules: Vec<(Stage, Vec<Regex>)>,
}

impl KeywordStageClassifier {
    /// Build a classifier from configured rules. Invalid patterns are config errors.
    pub fn new(rules: &[StageRuleEntry]) -> Result<Self> {
        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules {
            let patterns = rule
                .keywords
                .iter()
                .map(|kw| compile_keyword(kw))
                .collect::<Result<Vec<_>>>()?;
            compiled.push((rule.stage, patterns));
        }
        compiled.sort_by_key(|(stage, _)| *stage);
        Ok(Self { rules: compiled })
    }

    /// The built-in agent-tutorial vocabulary.
    pub fn builtin() -> Self {
        let rules = BUILTIN_STAGE_KEYWORDS
            .iter()
            .map(|(stage, keywords)| StageRuleEntry {
                stage: *stage,
                keywords: keywords.iter().map(|kw| kw.to_string()).collect(),
            })
            .collect::<Vec<_>>();
        Self::new(&rules).expect("built-in stage keywords are valid regex")
    }
}

fn compile_keyword(keyword: &str) -> Result<Regex> {
    Regex::new(&format!(r"(?i)\b(?:{keyword})"))
        .map_err(|e| DocSyncError::config(format!("invalid stage keyword '{keyword}': {e}")))
}

impl StageClassifier for KeywordStageClassifier {
    fn classify(&self, text: &str) -> Option<Stage> {
        let mut best: Option<(Stage, usize)> = None;
        for (stage, patterns) in &self.rules {
            let hits = patterns.iter().filter(|re| re.is_match(text)).count();
            if hits == 0 {
                continue;
            }
            if best.is_none_or(|(_, best_hits)| hits >= best_hits) {
                best = Some((*stage, hits));
            }
        }
        best.map(|(stage, _)| stage)
    }
}

// ---------------------------------------------------------------------------
// Phrase synonym table
// ---------------------------------------------------------------------------

const BUILTIN_SYNONYMS: [(&str, &[&str]); 8] = [
    (
        "persistence",
        &["memory persistence", "persistent memory", "persisted state", "state persistence"],
    ),
    ("tool calling", &["function calling", "tool use", "tool usage"]),
    ("multi agent", &["multiagent", "multiple agents", "agent teams"]),
    ("human in the loop", &["hitl", "human approval"]),
    ("llm", &["large language model", "large language models", "llms"]),
    ("rag", &["retrieval augmented generation"]),
    ("checkpoint", &["checkpointing", "checkpoints", "checkpointer"]),
    ("streaming", &["stream", "streams"]),
];

/// Replaces variant phrases with their canonical phrase, longest variant first.
#[derive(Debug, Clone, Default)]
pub struct PhraseSynonymTable {
    /// (variant tokens, canonical tokens), longest variant first.
    entries: Vec<(Vec<String>, Vec<String>)>,
}

impl PhraseSynonymTable {
    pub fn new(entries: &[SynonymEntry]) -> Self {
        let mut table = Self::default();
        table.extend(entries);
        table
    }

    /// The built-in table.
    pub fn builtin() -> Self {
        let entries = BUILTIN_SYNONYMS
            .iter()
            .map(|(canonical, variants)| SynonymEntry {
                canonical: canonical.to_string(),
                variants: variants.iter().map(|v| v.to_string()).collect(),
            })
            .collect::<Vec<_>>();
        Self::new(&entries)
    }

    /// Add more entries. Later entries win over earlier ones for the same variant.
    pub fn extend(&mut self, entries: &[SynonymEntry]) {
        for entry in entries {
            let canonical = tokenize(&entry.canonical);
            if canonical.is_empty() {
                continue;
            }
            for variant in &entry.variants {
                let variant = tokenize(variant);
                if variant.is_empty() || variant == canonical {
                    continue;
                }
                self.entries.retain(|(existing, _)| *existing != variant);
                self.entries.push((variant, canonical.clone()));
            }
        }
        // Stable sort keeps insertion order among equal lengths.
        self.entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SynonymFolder for PhraseSynonymTable {
    fn fold(&self, tokens: Vec<String>) -> Vec<String> {
        let mut folded = Vec::with_capacity(tokens.len());
        let mut i = 0;
        while i < tokens.len() {
            let hit = self
                .entries
                .iter()
                .find(|(variant, _)| tokens[i..].starts_with(variant));
            match hit {
                Some((variant, canonical)) => {
                    folded.extend(canonical.iter().cloned());
                    i += variant.len();
                }
                None => {
                    folded.push(tokens[i].clone());
                    i += 1;
                }
            }
        }
        folded
    }
}

// ---------------------------------------------------------------------------
// Vocabulary bundle
// ---------------------------------------------------------------------------

/// The rule sets used by the parser, indexer and planner.
#[derive(Clone)]
pub struct Vocabulary {
    pub stages: Arc<dyn StageClassifier>,
    pub synonyms: Arc<dyn SynonymFolder>,
}

impl Vocabulary {
    pub fn new(stages: Arc<dyn StageClassifier>, synonyms: Arc<dyn SynonymFolder>) -> Self {
        Self { stages, synonyms }
    }

    /// Built-in stage keywords and synonym table.
    pub fn builtin() -> Self {
        Self::new(
            Arc::new(KeywordStageClassifier::builtin()),
            Arc::new(PhraseSynonymTable::builtin()),
        )
    }

    /// Configured `[[stages]]` replace the built-in keywords; configured
    /// `[[synonyms]]` extend the built-in table.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let stages = if config.stages.is_empty() {
            KeywordStageClassifier::builtin()
        } else {
            KeywordStageClassifier::new(&config.stages)?
        };

        let mut synonyms = PhraseSynonymTable::builtin();
        synonyms.extend(&config.synonyms);

        debug!(
            custom_stages = !config.stages.is_empty(),
            synonym_variants = synonyms.len(),
            "vocabulary loaded"
        );

        Ok(Self::new(Arc::new(stages), Arc::new(synonyms)))
    }

    pub fn classify(&self, text: &str) -> Option<Stage> {
        self.stages.classify(text)
    }

    /// Tokenize then fold.
    pub fn folded_tokens(&self, text: &str) -> Vec<String> {
        self.synonyms.fold(tokenize(text))
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for Vocabulary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vocabulary").finish_non_exhaustive()
    }
}
