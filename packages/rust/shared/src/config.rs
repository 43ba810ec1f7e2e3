//! Application configuration for docsync.
//!
//! User config lives at `~/.docsync/docsync.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DocSyncError, Result};
use crate::types::Stage;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "docsync.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".docsync";

/// Upper bound on parallel page fetches.
pub const MAX_FETCH_CONCURRENCY: u32 = 8;

// ---------------------------------------------------------------------------
// Config structs (matching docsync.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Fetch limits and scope.
    #[serde(default)]
    pub fetch: FetchSection,

    /// Gap planning knobs.
    #[serde(default)]
    pub planner: PlannerSection,

    /// Stage vocabulary. Replaces the built-in vocabulary when non-empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stages: Vec<StageRuleEntry>,

    /// Extra synonym folds, appended to the built-in table.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub synonyms: Vec<SynonymEntry>,
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchSection {
    /// Link hops followed from the root page.
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Hard cap on fetched pages per run.
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    /// Parallel fetches (clamped to 1..=8).
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Deadline for the whole fetch phase.
    #[serde(default = "default_run_timeout")]
    pub run_timeout_secs: u64,

    /// Per-request timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Delay before each request.
    #[serde(default)]
    pub rate_limit_ms: u64,

    /// URL path include globs.
    #[serde(default)]
    pub include_patterns: Vec<String>,

    /// URL path exclude globs.
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

impl Default for FetchSection {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_pages: default_max_pages(),
            concurrency: default_concurrency(),
            run_timeout_secs: default_run_timeout(),
            request_timeout_secs: default_request_timeout(),
            rate_limit_ms: 0,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
        }
    }
}

fn default_max_depth() -> u32 {
    2
}
fn default_max_pages() -> usize {
    40
}
fn default_concurrency() -> u32 {
    6
}
fn default_run_timeout() -> u64 {
    60
}
fn default_request_timeout() -> u64 {
    20
}

/// `[planner]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerSection {
    /// Minimum affinity for extending an existing section.
    #[serde(default = "default_threshold")]
    pub affinity_threshold: f64,

    /// Score damping per stage of distance between topic and section.
    #[serde(default = "default_stage_penalty")]
    pub stage_penalty: f64,

    /// Deepest heading level on reference pages that counts as a topic.
    #[serde(default = "default_topic_depth")]
    pub topic_heading_depth: u8,

    /// Headings never treated as topics (compared after normalization).
    #[serde(default = "default_ignored_headings")]
    pub ignored_headings: Vec<String>,
}

impl Default for PlannerSection {
    fn default() -> Self {
        Self {
            affinity_threshold: default_threshold(),
            stage_penalty: default_stage_penalty(),
            topic_heading_depth: default_topic_depth(),
            ignored_headings: default_ignored_headings(),
        }
    }
}

fn default_threshold() -> f64 {
    0.25
}
fn default_stage_penalty() -> f64 {
    1.0
}
fn default_topic_depth() -> u8 {
    2
}
fn default_ignored_headings() -> Vec<String> {
    [
        "overview",
        "introduction",
        "next steps",
        "see also",
        "prerequisites",
        "summary",
        "conclusion",
        "table of contents",
        "on this page",
        "related",
        "resources",
        "what's next",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// `[[stages]]` entry: keyword regexes that mark a heading as belonging to a stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRuleEntry {
    pub stage: Stage,
    pub keywords: Vec<String>,
}

/// `[[synonyms]]` entry: phrases folded onto one canonical phrase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynonymEntry {
    pub canonical: String,
    pub variants: Vec<String>,
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config file + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime fetch configuration.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub max_depth: u32,
    pub max_pages: usize,
    pub concurrency: u32,
    pub run_timeout: Duration,
    pub request_timeout: Duration,
    pub rate_limit_ms: u64,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        let fetch = &config.fetch;
        Self {
            max_depth: fetch.max_depth,
            max_pages: fetch.max_pages.max(1),
            concurrency: fetch.concurrency.clamp(1, MAX_FETCH_CONCURRENCY),
            run_timeout: Duration::from_secs(fetch.run_timeout_secs.max(1)),
            request_timeout: Duration::from_secs(fetch.request_timeout_secs.max(1)),
            rate_limit_ms: fetch.rate_limit_ms,
            include_patterns: fetch.include_patterns.clone(),
            exclude_patterns: fetch.exclude_patterns.clone(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

/// Runtime planner configuration.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    pub affinity_threshold: f64,
    pub stage_penalty: f64,
    pub topic_heading_depth: u8,
    pub ignored_headings: Vec<String>,
}

impl From<&AppConfig> for PlannerConfig {
    fn from(config: &AppConfig) -> Self {
        let planner = &config.planner;
        Self {
            affinity_threshold: planner.affinity_threshold,
            stage_penalty: planner.stage_penalty.max(0.0),
            topic_heading_depth: planner.topic_heading_depth.clamp(1, 6),
            ignored_headings: planner.ignored_headings.clone(),
        }
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.docsync/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| DocSyncError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.docsync/docsync.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| DocSyncError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| DocSyncError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| DocSyncError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let content = toml::to_string_pretty(&AppConfig::default())
        .map_err(|e| DocSyncError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| DocSyncError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
