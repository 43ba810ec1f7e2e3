//! End-to-end `sync` pipeline: URL → fetch → parse → index → plan → edit → publish.
//!
//! Everything after the fetch is pure and deterministic: the same corpus and
//! narrative text always produce the same proposal. No file is read or
//! written here; callers hand in the narrative text and decide what to do
//! with the result.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{info, instrument, warn};
use url::Url;

use docsync_crawler::{FetchObserver, Fetcher};
use docsync_shared::{
    AppConfig, Corpus, FetchConfig, NarrativeDocument, Omission, PlannerConfig, Result, TopicSet,
};

use crate::editor::{ContentSynthesizer, EditPlan, TemplateSynthesizer, apply, build_plan};
use crate::narrative::parse_narrative;
use crate::planner::{GapPlanner, PlanOutcome};
use crate::publisher::{ChangeProposal, SyncReport, publish};
use crate::topics::TopicIndexer;
use crate::vocabulary::Vocabulary;

// ---------------------------------------------------------------------------
// Context and config
// ---------------------------------------------------------------------------

/// The swappable pieces of a run: vocabulary, planner knobs, and the
/// content synthesizer.
#[derive(Clone)]
pub struct SyncContext {
    pub vocabulary: Vocabulary,
    pub planner: PlannerConfig,
    pub synthesizer: Arc<dyn ContentSynthesizer>,
}

impl SyncContext {
    /// Build the context described by a loaded config file.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            vocabulary: Vocabulary::from_config(config)?,
            planner: PlannerConfig::from(config),
            synthesizer: Arc::new(TemplateSynthesizer),
        })
    }

    pub fn with_synthesizer(mut self, synthesizer: Arc<dyn ContentSynthesizer>) -> Self {
        self.synthesizer = synthesizer;
        self
    }

    fn indexer(&self) -> TopicIndexer {
        TopicIndexer::new(self.vocabulary.clone(), &self.planner)
    }
}

impl Default for SyncContext {
    fn default() -> Self {
        Self {
            vocabulary: Vocabulary::builtin(),
            planner: PlannerConfig::default(),
            synthesizer: Arc::new(TemplateSynthesizer),
        }
    }
}

impl fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncContext")
            .field("vocabulary", &self.vocabulary)
            .field("planner", &self.planner)
            .finish_non_exhaustive()
    }
}

/// Configuration for [`run_sync`].
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Root of the reference documentation.
    pub url: Url,
    pub fetch: FetchConfig,
    pub context: SyncContext,
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Gaps for a narrative without editing it.
#[derive(Debug, Clone, Serialize)]
pub struct PlanReport {
    pub external: TopicSet,
    pub narrative: TopicSet,
    pub plan: PlanOutcome,
}

/// Result of a full sync.
#[derive(Debug)]
pub struct SyncOutcome {
    pub proposal: ChangeProposal,
    pub edit_plan: EditPlan,
    pub elapsed: std::time::Duration,
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when a page joins the corpus.
    fn page_fetched(&self, page_id: &str, fetched: usize);
    /// Called when a page is left out of the corpus.
    fn page_omitted(&self, omission: &Omission);
    /// Called when the run completes.
    fn done(&self, report: &SyncReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn page_fetched(&self, _page_id: &str, _fetched: usize) {}
    fn page_omitted(&self, _omission: &Omission) {}
    fn done(&self, _report: &SyncReport) {}
}

/// Forwards fetcher events to a [`ProgressReporter`].
struct FetchProgress<'a> {
    inner: &'a dyn ProgressReporter,
}

impl FetchObserver for FetchProgress<'_> {
    fn page_fetched(&self, page_id: &str, fetched: usize) {
        self.inner.page_fetched(page_id, fetched);
    }

    fn page_omitted(&self, omission: &Omission) {
        self.inner.page_omitted(omission);
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Fetch the reference corpus. Page failures become omissions; only a
/// client that cannot be built is an error.
#[instrument(skip_all, fields(root = %root))]
pub async fn fetch_corpus(
    root: &Url,
    config: FetchConfig,
    progress: &dyn ProgressReporter,
) -> Result<Corpus> {
    let fetcher = Fetcher::new(config)?;
    let corpus = fetcher
        .fetch_observed(root, &FetchProgress { inner: progress })
        .await;

    if corpus.pages.is_empty() {
        warn!(
            omissions = corpus.omissions.len(),
            "no pages fetched; every reference topic will be missing from the comparison"
        );
    }
    Ok(corpus)
}

/// Parse, index, and plan without editing.
#[instrument(skip_all, fields(pages = corpus.pages.len()))]
pub fn plan_corpus(corpus: &Corpus, narrative_text: &str, ctx: &SyncContext) -> Result<PlanReport> {
    let doc = parse_narrative(narrative_text, &ctx.vocabulary)?;
    Ok(plan_document(corpus, &doc, ctx))
}

/// The pure core of a run: parse → index → plan → edit → publish.
#[instrument(skip_all, fields(pages = corpus.pages.len()))]
pub fn sync_corpus(corpus: &Corpus, narrative_text: &str, ctx: &SyncContext) -> Result<SyncOutcome> {
    let doc = parse_narrative(narrative_text, &ctx.vocabulary)?;
    sync_document(corpus, &doc, ctx, Instant::now())
}

/// Run the full `sync` pipeline.
///
/// 1. Parse the narrative (fails fast, before any network traffic)
/// 2. Fetch the reference corpus
/// 3. Index, plan, edit, publish
#[instrument(skip_all, fields(url = %config.url))]
pub async fn run_sync(
    config: &SyncConfig,
    narrative_text: &str,
    progress: &dyn ProgressReporter,
) -> Result<SyncOutcome> {
    let start = Instant::now();

    progress.phase("Parsing narrative");
    let doc = parse_narrative(narrative_text, &config.context.vocabulary)?;

    progress.phase("Fetching reference documentation");
    let corpus = fetch_corpus(&config.url, config.fetch.clone(), progress).await?;

    progress.phase("Planning edits");
    let outcome = sync_document(&corpus, &doc, &config.context, start)?;

    progress.done(outcome.proposal.report());
    Ok(outcome)
}

fn plan_document(corpus: &Corpus, doc: &NarrativeDocument, ctx: &SyncContext) -> PlanReport {
    let indexer = ctx.indexer();
    let external = indexer.index_corpus(corpus);
    let narrative = indexer.index_narrative(doc);
    let plan = GapPlanner::new(&indexer, &ctx.planner).plan(&external, &narrative, doc);
    PlanReport {
        external,
        narrative,
        plan,
    }
}

fn sync_document(
    corpus: &Corpus,
    doc: &NarrativeDocument,
    ctx: &SyncContext,
    start: Instant,
) -> Result<SyncOutcome> {
    let planned = plan_document(corpus, doc, ctx);

    let edit_plan = build_plan(doc, &planned.plan.gaps, ctx.synthesizer.as_ref());
    let outcome = apply(doc, &edit_plan)?;

    let mut report = SyncReport::new(corpus.root.clone());
    report.pages_fetched = corpus.pages.len();
    report.omissions = corpus.omissions.clone();
    report.external_topics = planned.external.len();
    report.narrative_topics = planned.narrative.len();
    report.gaps = planned.plan.gaps.len();
    report.warnings = planned.plan.warnings;

    let proposal = publish(doc, &outcome, report);
    let elapsed = start.elapsed();

    info!(
        run_id = %proposal.report().run_id,
        up_to_date = proposal.is_up_to_date(),
        applied = proposal.report().summary.len(),
        unplaced = proposal.report().unplaced.len(),
        elapsed_ms = elapsed.as_millis() as u64,
        "sync complete"
    );

    Ok(SyncOutcome {
        proposal,
        edit_plan,
        elapsed,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use docsync_markdown::outline;
    use docsync_shared::{CorpusPage, DocSyncError, FetchError, Stage};

    use super::*;
    use crate::editor::EditKind;

    const TUTORIAL: &str = include_str!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../../../fixtures/narrative/agent-tutorial.md"
    ));

    const DURABLE: &str = "## Durable session storage across restarts\n\nPersist each session to a database so the agent resumes after a restart.\n";
    const MULTI_AGENT: &str = "## Multi-agent orchestration\n\nCoordinate several specialised agents under a supervisor that routes work between them.\n";
    const STREAMING: &str = "## Streaming responses\n\nStream tokens to the user as the model generates them.\n";

    fn page(id: &str, markdown: &str) -> CorpusPage {
        CorpusPage {
            id: id.into(),
            url: format!("https://docs.example.com/{id}"),
            title: None,
            markdown: markdown.into(),
            headings: outline(markdown),
            content_hash: id.into(),
        }
    }

    fn corpus(pages: &[(&str, &str)]) -> Corpus {
        let pages: BTreeMap<String, CorpusPage> = pages
            .iter()
            .map(|(id, md)| (id.to_string(), page(id, md)))
            .collect();
        Corpus {
            root: "https://docs.example.com/".into(),
            pages,
            omissions: Vec::new(),
        }
    }

    fn edited_text(outcome: &SyncOutcome) -> &str {
        match &outcome.proposal {
            ChangeProposal::Changes(set) => &set.edited_text,
            ChangeProposal::UpToDate(_) => panic!("expected changes"),
        }
    }

    #[test]
    fn fixture_parses_into_three_stages() {
        let doc = parse_narrative(TUTORIAL, &Vocabulary::builtin()).unwrap();
        let stages: Vec<Stage> = doc.sections.iter().map(|s| s.stage).collect();
        assert_eq!(stages, vec![Stage::Basic, Stage::Stateful, Stage::ToolUsing]);
        assert_eq!(doc.render(), TUTORIAL);
    }

    #[test]
    fn durable_storage_extends_remembering_things() {
        let ctx = SyncContext::default();
        let outcome = sync_corpus(&corpus(&[("guide/memory", DURABLE)]), TUTORIAL, &ctx).unwrap();

        let summary = &outcome.proposal.report().summary;
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].section_id, "remembering-things");
        assert_eq!(summary[0].insertion, EditKind::Extend);
        assert_eq!(summary[0].target_stage, Stage::Stateful);
    }

    #[test]
    fn multi_agent_orchestration_becomes_a_trailing_section() {
        let ctx = SyncContext::default();
        let outcome =
            sync_corpus(&corpus(&[("guide/multi-agent", MULTI_AGENT)]), TUTORIAL, &ctx).unwrap();

        let report = outcome.proposal.report();
        assert_eq!(report.summary[0].insertion, EditKind::Insert);
        assert_eq!(report.summary[0].target_stage, Stage::Production);
        assert_eq!(report.warnings.len(), 1);

        let edited = parse_narrative(edited_text(&outcome), &ctx.vocabulary).unwrap();
        let last = edited.sections.last().unwrap();
        assert_eq!(last.title, "Multi-agent orchestration");
        assert_eq!(last.stage, Stage::Production);
        assert_eq!(edited.sections.len(), 4);
    }

    #[test]
    fn second_run_over_edited_text_is_empty() {
        let ctx = SyncContext::default();
        let corpus = corpus(&[
            ("guide/memory", DURABLE),
            ("guide/multi-agent", MULTI_AGENT),
            ("guide/streaming", STREAMING),
        ]);

        let first = sync_corpus(&corpus, TUTORIAL, &ctx).unwrap();
        assert_eq!(first.edit_plan.len(), 3);

        let second = sync_corpus(&corpus, edited_text(&first), &ctx).unwrap();
        assert!(second.edit_plan.is_empty());
        assert!(second.proposal.is_up_to_date());
    }

    const ENVIRONMENT: &str = "## Setup\n\nInstall the package.\n\n## Environment setup\n\nInstall the agent package and set up the environment.\n";

    const LONE_H1: &str = "# Setup\n\nInstall the agent package and set up the environment before the first run.\n";

    #[test]
    fn lone_h1_narrative_converges_after_one_run() {
        let ctx = SyncContext::default();
        let corpus = corpus(&[("guide/setup", ENVIRONMENT)]);

        let first = sync_corpus(&corpus, LONE_H1, &ctx).unwrap();
        let summary = &first.proposal.report().summary;
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].section_id, "setup");
        assert_eq!(summary[0].insertion, EditKind::Extend);

        let edited = parse_narrative(edited_text(&first), &ctx.vocabulary).unwrap();
        assert!(edited.preamble.is_empty());
        assert_eq!(edited.sections.len(), 1);
        assert_eq!(edited.sections[0].title, "Setup");

        let second = plan_corpus(&corpus, edited_text(&first), &ctx).unwrap();
        assert!(second.plan.is_empty(), "{:?}", second.plan.gaps);
        assert!(sync_corpus(&corpus, edited_text(&first), &ctx).unwrap().proposal.is_up_to_date());
    }

    #[test]
    fn every_narrative_shape_converges_after_one_run() {
        let shapes = [
            ("titled", TUTORIAL),
            ("lone h1", LONE_H1),
            (
                "setext",
                "Building an Agent\n=================\n\nA tour.\n\nSetup\n-----\n\nInstall the agent package and export your API key.\n\nRemembering Things\n------------------\n\nKeep the conversation in a session and persist it to storage.\n\nCalling Tools\n-------------\n\nGive the agent functions it can call.\n",
            ),
            (
                "h1 sections",
                "# Setup\n\nInstall the agent package.\n\n# Remembering Things\n\nPersist the session to storage.\n\n# Calling Tools\n\nGive the agent functions it can call.\n",
            ),
            (
                "untitled",
                "## Setup\n\nInstall the agent package.\n\n## Remembering Things\n\nPersist the session to storage.\n\n## Calling Tools\n\nGive the agent functions it can call.\n",
            ),
        ];
        let ctx = SyncContext::default();
        let corpus = corpus(&[
            ("guide/memory", DURABLE),
            ("guide/multi-agent", MULTI_AGENT),
            ("guide/setup", ENVIRONMENT),
            ("guide/streaming", STREAMING),
        ]);

        for (name, text) in shapes {
            let original = parse_narrative(text, &ctx.vocabulary).unwrap();
            let first = sync_corpus(&corpus, text, &ctx).unwrap();
            assert!(!first.proposal.is_up_to_date(), "{name}: nothing applied");

            let inserted = first
                .proposal
                .report()
                .summary
                .iter()
                .filter(|e| e.insertion == EditKind::Insert)
                .count();
            let edited = parse_narrative(edited_text(&first), &ctx.vocabulary).unwrap();
            assert_eq!(edited.preamble, original.preamble, "{name}: preamble changed");
            assert_eq!(edited.sections.len(), original.sections.len() + inserted, "{name}");
            edited.validate().unwrap();
            assert!(edited.sections.windows(2).all(|w| w[0].stage <= w[1].stage), "{name}");

            let after = plan_corpus(&corpus, edited_text(&first), &ctx).unwrap();
            assert!(after.external.is_subset(&after.narrative), "{name}: topics left uncovered");
            assert!(after.plan.is_empty(), "{name}: {:?}", after.plan.gaps);

            let second = sync_corpus(&corpus, edited_text(&first), &ctx).unwrap();
            assert!(second.edit_plan.is_empty(), "{name}: second run edited");
            assert!(second.proposal.is_up_to_date(), "{name}");
        }
    }

    #[test]
    fn every_reference_topic_is_covered_after_one_run() {
        let ctx = SyncContext::default();
        let corpus = corpus(&[
            ("guide/memory", DURABLE),
            ("guide/multi-agent", MULTI_AGENT),
            ("guide/streaming", STREAMING),
        ]);

        let outcome = sync_corpus(&corpus, TUTORIAL, &ctx).unwrap();
        let after = plan_corpus(&corpus, edited_text(&outcome), &ctx).unwrap();
        assert!(after.external.is_subset(&after.narrative));
        assert!(after.plan.is_empty());
    }

    #[test]
    fn edited_stages_stay_monotonic() {
        let ctx = SyncContext::default();
        let corpus = corpus(&[
            ("guide/memory", DURABLE),
            ("guide/multi-agent", MULTI_AGENT),
            ("guide/streaming", STREAMING),
            ("guide/quickstart", "## Hello world quickstart\n\nPrint a greeting from a minimal script.\n"),
        ]);

        let outcome = sync_corpus(&corpus, TUTORIAL, &ctx).unwrap();
        let edited = parse_narrative(edited_text(&outcome), &ctx.vocabulary).unwrap();
        edited.validate().unwrap();
        assert!(edited.sections.windows(2).all(|w| w[0].stage <= w[1].stage));
    }

    #[test]
    fn covered_corpus_reports_no_changes() {
        let ctx = SyncContext::default();
        let corpus = corpus(&[
            ("setup", "## Setup\n\nInstall the package.\n"),
            ("tools", "## Calling tools\n\nFunctions the model can call.\n\n## Overview\n\nIgnored.\n"),
        ]);

        let outcome = sync_corpus(&corpus, TUTORIAL, &ctx).unwrap();
        assert!(outcome.edit_plan.is_empty());
        let ChangeProposal::UpToDate(report) = &outcome.proposal else {
            panic!("expected up to date");
        };
        assert!(report.up_to_date);
        assert!(report.to_markdown().contains("No changes needed."));
    }

    #[test]
    fn omitted_pages_are_reported_and_the_run_completes() {
        let ctx = SyncContext::default();
        let mut corpus = corpus(&[
            ("guide/memory", DURABLE),
            ("guide/multi-agent", MULTI_AGENT),
            ("guide/streaming", STREAMING),
        ]);
        corpus.omissions = vec![
            Omission {
                page_id: "guide/broken".into(),
                error: FetchError::Status {
                    url: "https://docs.example.com/guide/broken".into(),
                    status: 500,
                },
            },
            Omission {
                page_id: "guide/slow".into(),
                error: FetchError::TimedOut {
                    url: "https://docs.example.com/guide/slow".into(),
                },
            },
        ];

        let outcome = sync_corpus(&corpus, TUTORIAL, &ctx).unwrap();
        let report = outcome.proposal.report();
        assert_eq!(report.pages_fetched, 3);
        assert_eq!(report.external_topics, 3);
        let omitted: Vec<&str> = report.omissions.iter().map(|o| o.page_id.as_str()).collect();
        assert_eq!(omitted, vec!["guide/broken", "guide/slow"]);
        assert!(report.to_markdown().contains("`guide/slow`"));
    }

    #[test]
    fn empty_corpus_is_up_to_date() {
        let outcome = sync_corpus(&Corpus::default(), TUTORIAL, &SyncContext::default()).unwrap();
        assert!(outcome.proposal.is_up_to_date());
    }

    #[test]
    fn narrative_without_headings_fails() {
        let err = sync_corpus(&corpus(&[]), "plain prose\n", &SyncContext::default()).unwrap_err();
        assert!(matches!(err, DocSyncError::Parse { .. }));
    }

    #[test]
    fn config_vocabulary_flows_into_planning() {
        let config: AppConfig = toml::from_str(
            r#"
            [planner]
            ignored_headings = ["streaming responses"]
            "#,
        )
        .unwrap();
        let ctx = SyncContext::from_config(&config).unwrap();
        let report = plan_corpus(&corpus(&[("guide/streaming", STREAMING)]), TUTORIAL, &ctx).unwrap();
        assert!(report.external.is_empty());
    }

    #[derive(Default)]
    struct Recorder {
        phases: Mutex<Vec<String>>,
        omitted: Mutex<Vec<String>>,
        done: Mutex<bool>,
    }

    impl ProgressReporter for Recorder {
        fn phase(&self, name: &str) {
            self.phases.lock().unwrap().push(name.to_string());
        }
        fn page_fetched(&self, _page_id: &str, _fetched: usize) {}
        fn page_omitted(&self, omission: &Omission) {
            self.omitted.lock().unwrap().push(omission.page_id.clone());
        }
        fn done(&self, _report: &SyncReport) {
            *self.done.lock().unwrap() = true;
        }
    }

    #[tokio::test]
    async fn run_sync_degrades_when_the_root_is_refused() {
        let config = SyncConfig {
            url: Url::parse("http://127.0.0.1:9/docs/").unwrap(),
            fetch: FetchConfig::default(),
            context: SyncContext::default(),
        };
        let progress = Recorder::default();

        let outcome = run_sync(&config, TUTORIAL, &progress).await.unwrap();

        let report = outcome.proposal.report();
        assert!(outcome.proposal.is_up_to_date());
        assert_eq!(report.omissions.len(), 1);
        assert!(matches!(report.omissions[0].error, FetchError::Blocked { .. }));
        assert_eq!(progress.omitted.lock().unwrap().len(), 1);
        assert_eq!(progress.phases.lock().unwrap().len(), 3);
        assert!(*progress.done.lock().unwrap());
    }

    #[tokio::test]
    async fn run_sync_rejects_bad_narrative_before_fetching() {
        let config = SyncConfig {
            url: Url::parse("http://127.0.0.1:9/docs/").unwrap(),
            fetch: FetchConfig::default(),
            context: SyncContext::default(),
        };
        let progress = Recorder::default();

        let err = run_sync(&config, "no headings", &progress).await.unwrap_err();
        assert!(matches!(err, DocSyncError::Parse { .. }));
        assert_eq!(*progress.phases.lock().unwrap(), vec!["Parsing narrative".to_string()]);
    }
}
