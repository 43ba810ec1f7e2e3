//! Topic indexer: canonical topic sets from the corpus and the narrative.

use std::collections::HashSet;

use tracing::{debug, instrument};

use docsync_markdown::{bold_leads, scan};
use docsync_shared::{Corpus, NarrativeDocument, PlannerConfig, Topic, TopicKey, TopicSet};

use crate::vocabulary::Vocabulary;

/// Words that carry no placement signal.
const STOPWORDS: &[&str] = &[
    "a", "about", "across", "after", "all", "also", "an", "and", "any", "are", "as", "at", "be",
    "been", "before", "between", "but", "by", "can", "do", "does", "each", "for", "from", "get",
    "has", "have", "how", "if", "in", "into", "is", "it", "its", "just", "may", "more", "most",
    "no", "not", "of", "on", "one", "or", "other", "our", "out", "over", "same", "so", "some",
    "such", "than", "that", "the", "their", "them", "then", "there", "these", "they", "this",
    "those", "to", "too", "up", "use", "using", "very", "via", "was", "we", "what", "when",
    "where", "which", "while", "who", "why", "will", "with", "within", "without", "you", "your",
];

/// Builds [`TopicSet`]s with one shared normalization.
#[derive(Debug, Clone)]
pub struct TopicIndexer {
    vocabulary: Vocabulary,
    heading_depth: u8,
    ignored: HashSet<TopicKey>,
}

impl TopicIndexer {
    pub fn new(vocabulary: Vocabulary, config: &PlannerConfig) -> Self {
        let mut indexer = Self {
            vocabulary,
            heading_depth: config.topic_heading_depth,
            ignored: HashSet::new(),
        };
        indexer.ignored = config
            .ignored_headings
            .iter()
            .map(|h| indexer.key(h))
            .collect();
        indexer
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    /// Normalized topic key: lowercase, punctuation stripped, whitespace
    /// collapsed, synonyms folded.
    pub fn key(&self, text: &str) -> TopicKey {
        TopicKey(self.vocabulary.folded_tokens(text).join(" "))
    }

    /// Content-bearing tokens used for affinity scoring.
    pub fn affinity_tokens(&self, text: &str) -> Vec<String> {
        self.vocabulary
            .folded_tokens(text)
            .into_iter()
            .filter(|t| !STOPWORDS.contains(&t.as_str()) && !t.chars().all(|c| c.is_ascii_digit()))
            .map(|t| stem(&t))
            .collect()
    }

    fn accept(&self, key: &TopicKey) -> bool {
        !key.as_str().is_empty() && !self.ignored.contains(key)
    }

    /// External topics: page headings up to the configured depth, described
    /// by their lead paragraph. Pages are visited in page-id order.
    #[instrument(skip_all, fields(pages = corpus.pages.len()))]
    pub fn index_corpus(&self, corpus: &Corpus) -> TopicSet {
        let mut topics = TopicSet::new();
        for page in corpus.pages.values() {
            for heading in page.headings.iter().filter(|h| h.level <= self.heading_depth) {
                let key = self.key(&heading.text);
                if !self.accept(&key) {
                    continue;
                }
                topics.insert(Topic {
                    key,
                    title: heading.text.clone(),
                    description: heading.lead.clone(),
                    origin: Some(page.url.clone()),
                });
            }
        }
        debug!(topics = topics.len(), "external topics indexed");
        topics
    }

    /// Narrative topics: every section title, every heading inside a section
    /// body, and every bold lead line standing in for a heading.
    #[instrument(skip_all, fields(sections = doc.sections.len()))]
    pub fn index_narrative(&self, doc: &NarrativeDocument) -> TopicSet {
        let mut topics = TopicSet::new();
        for section in &doc.sections {
            let titles = std::iter::once(section.title.clone())
                .chain(scan(&section.body).into_iter().map(|h| h.text))
                .chain(bold_leads(&section.body));
            for title in titles {
                let key = self.key(&title);
                if key.as_str().is_empty() {
                    continue;
                }
                topics.insert(Topic {
                    key,
                    title,
                    description: None,
                    origin: None,
                });
            }
        }
        debug!(topics = topics.len(), "narrative topics indexed");
        topics
    }
}

/// Light suffix stripping so "sessions", "persisted" and "remembering" meet
/// their stems.
fn stem(token: &str) -> String {
    let len = token.chars().count();
    if len > 4 && token.ends_with("ies") {
        return format!("{}y", &token[..token.len() - 3]);
    }
    if len > 5 && token.ends_with("ing") {
        return token[..token.len() - 3].to_string();
    }
    if len > 4 && token.ends_with("ed") {
        return token[..token.len() - 2].to_string();
    }
    if len > 3 && token.ends_with('s') && !token.ends_with("ss") {
        return token[..token.len() - 1].to_string();
    }
    token.to_string()
}
