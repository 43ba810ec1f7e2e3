//! Shared types, error model, and configuration for docsync.
//!
//! This crate is the foundation depended on by all other docsync crates.
//! It provides:
//! - [`DocSyncError`] and [`FetchError`]: the error model
//! - Domain types ([`Topic`], [`NarrativeDocument`], [`Gap`], [`Corpus`], [`Stage`])
//! - Configuration ([`AppConfig`], [`FetchConfig`], [`PlannerConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, FetchConfig, FetchSection, MAX_FETCH_CONCURRENCY, PlannerConfig, PlannerSection,
    StageRuleEntry, SynonymEntry, config_dir, config_file_path, init_config, load_config,
    load_config_from,
};
pub use error::{DocSyncError, FetchError, Result};
pub use types::{
    Corpus, CorpusPage, Gap, NarrativeDocument, NarrativeSection, Omission, OutlineHeading,
    Placement, PlanningAmbiguityWarning, RunId, Stage, Topic, TopicKey, TopicSet,
};
