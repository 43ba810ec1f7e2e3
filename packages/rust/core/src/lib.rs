//! Core domain logic and pipeline orchestration for docsync.
//!
//! Parses a tutorial narrative into stage-tagged sections, compares its
//! topics with a fetched reference corpus, plans where each missing topic
//! belongs, applies the edits to a new document, and packages the result as
//! a reviewable proposal. See [`pipeline::run_sync`] for the end-to-end flow.

pub mod editor;
pub mod narrative;
pub mod pipeline;
pub mod planner;
pub mod publisher;
pub mod topics;
pub mod vocabulary;

pub use editor::{
    AppliedEdit, ContentBlock, ContentSynthesizer, EditKind, EditOp, EditOutcome, EditPlan,
    TemplateSynthesizer,
};
pub use narrative::{parse_narrative, slugify};
pub use pipeline::{
    PlanReport, ProgressReporter, SilentProgress, SyncConfig, SyncContext, SyncOutcome,
    fetch_corpus, plan_corpus, run_sync, sync_corpus,
};
pub use planner::{GapPlanner, PlanOutcome};
pub use publisher::{ChangeKind, ChangeProposal, ChangeSet, SectionChange, SummaryEntry, SyncReport};
pub use topics::TopicIndexer;
pub use vocabulary::{
    KeywordStageClassifier, PhraseSynonymTable, StageClassifier, SynonymFolder, Vocabulary,
};
