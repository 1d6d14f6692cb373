//! BrandGraph CLI: organization graph store for brand research pipelines.
//!
//! Ingests collector and model output (pages, scrape queues, theses,
//! relations) into a local libSQL database and exposes the graph reads and
//! status transitions downstream tools rely on.

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
