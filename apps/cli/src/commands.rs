//! CLI command definitions, routing, and tracing setup.
//!
//! This is the only layer that touches the filesystem: it reads the narrative,
//! hands its text to the core, and writes whatever the core proposes.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use docsync_core::pipeline::{ProgressReporter, SyncConfig, SyncContext};
use docsync_core::{ChangeProposal, SyncReport, parse_narrative};
use docsync_shared::{
    AppConfig, DocSyncError, FetchConfig, Omission, init_config, load_config, load_config_from,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use url::Url;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// docsync: keep a tutorial narrative in step with its reference docs.
#[derive(Parser)]
#[command(
    name = "docsync",
    version,
    about = "Find reference topics a tutorial does not cover yet and propose stage-aware edits.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.docsync/docsync.toml).
    #[arg(long, global = true, env = "DOCSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Result output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Overrides for the `[fetch]` and `[planner]` config sections.
#[derive(Args, Debug, Default)]
pub(crate) struct FetchArgs {
    /// Link hops followed from the root page.
    #[arg(long)]
    pub max_depth: Option<u32>,

    /// Maximum number of pages fetched.
    #[arg(long)]
    pub max_pages: Option<usize>,

    /// Parallel fetches (1-8).
    #[arg(long)]
    pub concurrency: Option<u32>,

    /// Total fetch budget in seconds.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Minimum affinity score for extending an existing section.
    #[arg(long)]
    pub threshold: Option<f64>,
}

impl FetchArgs {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(depth) = self.max_depth {
            config.fetch.max_depth = depth;
        }
        if let Some(pages) = self.max_pages {
            config.fetch.max_pages = pages;
        }
        if let Some(concurrency) = self.concurrency {
            config.fetch.concurrency = concurrency;
        }
        if let Some(secs) = self.timeout {
            config.fetch.run_timeout_secs = secs;
        }
        if let Some(threshold) = self.threshold {
            config.planner.affinity_threshold = threshold;
        }
    }
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Fetch the reference docs, edit the narrative, and publish a proposal.
    Sync {
        /// Root URL of the reference documentation.
        url: String,

        /// Narrative file to compare against.
        #[arg(short, long)]
        narrative: PathBuf,

        /// Directory for the edited narrative, patch and reports.
        #[arg(short, long)]
        out_dir: Option<PathBuf>,

        /// Overwrite the narrative file with the edited text.
        #[arg(long)]
        write: bool,

        /// Output format for stdout.
        #[arg(long, default_value = "text")]
        format: OutputFormat,

        #[command(flatten)]
        fetch: FetchArgs,
    },

    /// Show the gaps and where they would go, without editing.
    Plan {
        /// Root URL of the reference documentation.
        url: String,

        /// Narrative file to compare against.
        #[arg(short, long)]
        narrative: PathBuf,

        /// Output format for stdout.
        #[arg(long, default_value = "text")]
        format: OutputFormat,

        #[command(flatten)]
        fetch: FetchArgs,
    },

    /// Show how the narrative splits into stage-tagged sections.
    Inspect {
        /// Narrative file to parse.
        #[arg(short, long)]
        narrative: PathBuf,

        /// Output format for stdout.
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "docsync=info",
        1 => "docsync=debug",
        _ => "docsync=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Command::Sync {
            url,
            narrative,
            out_dir,
            write,
            format,
            fetch,
        } => {
            let config = resolve_config(config_path.as_deref(), &fetch)?;
            cmd_sync(&config, &url, &narrative, out_dir.as_deref(), write, format).await
        }
        Command::Plan {
            url,
            narrative,
            format,
            fetch,
        } => {
            let config = resolve_config(config_path.as_deref(), &fetch)?;
            cmd_plan(&config, &url, &narrative, format).await
        }
        Command::Inspect { narrative, format } => {
            let config = resolve_config(config_path.as_deref(), &FetchArgs::default())?;
            cmd_inspect(&config, &narrative, format)
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path.as_deref()),
        },
    }
}

fn resolve_config(path: Option<&Path>, overrides: &FetchArgs) -> Result<AppConfig> {
    let mut config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    overrides.apply(&mut config);
    Ok(config)
}

fn parse_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url).map_err(|e| eyre!("invalid URL '{url}': {e}"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(eyre!("unsupported URL scheme '{}': expected http or https", parsed.scheme()));
    }
    Ok(parsed)
}

fn read_narrative(path: &Path) -> Result<String> {
    Ok(std::fs::read_to_string(path).map_err(|e| DocSyncError::io(path, e))?)
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    Ok(std::fs::write(path, contents).map_err(|e| DocSyncError::io(path, e))?)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_sync(
    config: &AppConfig,
    url: &str,
    narrative_path: &Path,
    out_dir: Option<&Path>,
    write: bool,
    format: OutputFormat,
) -> Result<()> {
    let sync_config = SyncConfig {
        url: parse_url(url)?,
        fetch: FetchConfig::from(config),
        context: SyncContext::from_config(config)?,
    };
    let narrative = read_narrative(narrative_path)?;

    info!(url, narrative = %narrative_path.display(), "syncing narrative");

    let reporter = CliProgress::new();
    let outcome = docsync_core::run_sync(&sync_config, &narrative, &reporter).await?;
    let proposal = &outcome.proposal;

    if let Some(dir) = out_dir {
        write_outputs(dir, proposal)?;
    }

    if write {
        if let ChangeProposal::Changes(set) = proposal {
            write_file(narrative_path, &set.edited_text)?;
            info!(path = %narrative_path.display(), "narrative updated in place");
        }
    }

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(proposal)?),
        OutputFormat::Text => {
            println!("{}", proposal.report().to_markdown());
            if let ChangeProposal::Changes(set) = proposal {
                if out_dir.is_none() && !write {
                    println!("{}", set.patch);
                }
            }
            eprintln!("  Time: {:.1}s", outcome.elapsed.as_secs_f64());
        }
    }

    Ok(())
}

/// Write the report, and for a change set also the patch and edited narrative.
fn write_outputs(dir: &Path, proposal: &ChangeProposal) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| DocSyncError::io(dir, e))?;

    let report = proposal.report();
    write_file(&dir.join("report.md"), &report.to_markdown())?;
    write_file(&dir.join("report.json"), &serde_json::to_string_pretty(proposal)?)?;

    if let ChangeProposal::Changes(set) = proposal {
        write_file(&dir.join("narrative.patch"), &set.patch)?;
        write_file(&dir.join("narrative.md"), &set.edited_text)?;
    }

    info!(dir = %dir.display(), run_id = %report.run_id, "outputs written");
    Ok(())
}

async fn cmd_plan(
    config: &AppConfig,
    url: &str,
    narrative_path: &Path,
    format: OutputFormat,
) -> Result<()> {
    let root = parse_url(url)?;
    let context = SyncContext::from_config(config)?;
    let narrative = read_narrative(narrative_path)?;
    // Fail on an unparseable narrative before fetching anything.
    parse_narrative(&narrative, &context.vocabulary)?;

    let reporter = CliProgress::new();
    reporter.phase("Fetching reference documentation");
    let corpus = docsync_core::fetch_corpus(&root, FetchConfig::from(config), &reporter).await?;
    reporter.spinner.finish_and_clear();

    let report = docsync_core::plan_corpus(&corpus, &narrative, &context)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            println!();
            println!(
                "  Topics: {} in reference, {} in narrative, {} missing",
                report.external.len(),
                report.narrative.len(),
                report.plan.gaps.len()
            );
            if !corpus.omissions.is_empty() {
                println!("  Omitted pages: {}", corpus.omissions.len());
            }
            println!();
            for gap in &report.plan.gaps {
                let target = match gap.target_section_id() {
                    Some(id) => id.to_string(),
                    None => "<start>".to_string(),
                };
                println!(
                    "  {:<40} {:<11} {:<7} {target} ({:.2})",
                    gap.topic.title,
                    gap.candidate_stage,
                    match gap.placement {
                        docsync_shared::Placement::Extend { .. } => "extend",
                        docsync_shared::Placement::Insert { .. } => "insert",
                    },
                    gap.score
                );
            }
            for warning in &report.plan.warnings {
                println!(
                    "  ! {}: best score {:.2} below {:.2}",
                    warning.title, warning.best_score, warning.threshold
                );
            }
            println!();
        }
    }

    Ok(())
}

fn cmd_inspect(config: &AppConfig, narrative_path: &Path, format: OutputFormat) -> Result<()> {
    let context = SyncContext::from_config(config)?;
    let narrative = read_narrative(narrative_path)?;
    let doc = parse_narrative(&narrative, &context.vocabulary)?;

    match format {
        OutputFormat::Json => {
            let sections: Vec<serde_json::Value> = doc
                .sections
                .iter()
                .map(|s| {
                    serde_json::json!({
                        "position": s.position,
                        "id": s.id,
                        "stage": s.stage,
                        "level": s.level,
                        "title": s.title,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&sections)?);
        }
        OutputFormat::Text => {
            println!();
            for s in &doc.sections {
                println!("  {:>3}  {:<11} {:<32} {}", s.position, s.stage, s.id, s.title);
            }
            println!();
        }
    }

    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config = resolve_config(path, &FetchArgs::default())?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn page_fetched(&self, page_id: &str, fetched: usize) {
        self.spinner.set_message(format!("Fetching [{fetched}] {page_id}"));
    }

    fn page_omitted(&self, omission: &Omission) {
        self.spinner
            .println(format!("  skipped {}: {}", omission.page_id, omission.error));
    }

    fn done(&self, _report: &SyncReport) {
        self.spinner.finish_and_clear();
    }
}
