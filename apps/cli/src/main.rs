//! docsync CLI: keep a tutorial narrative in step with its reference docs.
//!
//! Fetches the reference documentation, finds topics the narrative does not
//! cover yet, and proposes stage-aware edits as a patch plus a change report.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
