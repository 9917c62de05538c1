//! OTWatch CLI — OT/ICS threat monitoring agent.
//!
//! Ingests newly published CVEs, filters them for industrial-control
//! relevance with a local model, and writes a severity-ranked threat report.

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
