//! ontoplan Command-Line Tool
//!
//! Runs dependency analysis and migration planning against a graph snapshot.

mod commands;
mod formatter;

use clap::Parser;
use commands::Command;
use formatter::OutputFormat;
use ontoplan_core::{Error, GraphSnapshot, MemoryGraph, OntoplanConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// ontoplan Command-Line Tool
#[derive(Parser, Debug)]
#[command(name = "ontoplan")]
#[command(version, about = "Impact analysis and migration planning for ontology schema changes")]
pub struct Args {
    /// Graph snapshot (JSON)
    #[arg(short = 'g', long)]
    pub graph: PathBuf,

    /// Configuration file (JSON)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "table", value_enum)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[tokio::main]
async fn main() {
    // Logs go to stderr so stdout stays parseable.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("ontoplan=info,ontoplan_core=info")),
        )
        .init();

    let args = Args::parse();

    if let Err(e) = run(args).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Error> {
    let config = match &args.config {
        Some(path) => OntoplanConfig::load(path)?,
        None => OntoplanConfig::default(),
    };

    let snapshot = GraphSnapshot::load(&args.graph)?;
    let graph = MemoryGraph::from_snapshot(&snapshot, &config.analyzer);
    tracing::debug!(
        entities = snapshot.entities.len(),
        edges = snapshot.edges.len(),
        triples = graph.len(),
        "Loaded graph snapshot"
    );

    let formatter = formatter::create_formatter(args.format);
    let output = commands::execute(&args.command, Arc::new(graph), &config, &*formatter).await?;
    println!("{}", output);
    Ok(())
}
