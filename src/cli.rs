//! CLI commands for transit-route.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::info;

use crate::formats::{Snapshot, SnapshotFile};
use crate::request::{self, QueryEngine};

#[derive(Parser)]
#[command(name = "transit-route")]
#[command(about = "Transit catalogue build and query engine", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ingest base requests and write a catalogue snapshot
    Build {
        /// Request tree file (stdin when omitted)
        input: Option<PathBuf>,

        /// Snapshot path, overrides serialization_settings.file
        #[arg(short, long)]
        snapshot: Option<PathBuf>,
    },

    /// Load a snapshot and answer stat requests on stdout
    Serve {
        /// Request tree file (stdin when omitted)
        input: Option<PathBuf>,

        /// Snapshot path, overrides serialization_settings.file
        #[arg(short, long)]
        snapshot: Option<PathBuf>,
    },
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Build { input, snapshot } => run_build(input.as_deref(), snapshot),
            Commands::Serve { input, snapshot } => run_serve(input.as_deref(), snapshot),
        }
    }
}

fn read_request_tree(input: Option<&Path>) -> Result<Value> {
    let text = match input {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("reading request tree from {}", path.display()))?,
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("reading request tree from stdin")?;
            text
        }
    };
    serde_json::from_str(&text).context("parsing request tree")
}

fn resolve_snapshot_path(flag: Option<PathBuf>, from_tree: Option<PathBuf>) -> Result<PathBuf> {
    match flag.or(from_tree) {
        Some(path) => Ok(path),
        None => bail!("no snapshot path: pass --snapshot or set serialization_settings.file"),
    }
}

fn run_build(input: Option<&Path>, snapshot: Option<PathBuf>) -> Result<()> {
    let tree = read_request_tree(input)?;
    let build = request::ingest(&tree)?;
    let path = resolve_snapshot_path(snapshot, build.snapshot_file)?;

    let snapshot = Snapshot::capture(&build.catalogue, &build.render, build.router);
    SnapshotFile::write(&path, &snapshot)
        .with_context(|| format!("writing snapshot to {}", path.display()))?;
    info!(path = %path.display(), "snapshot written");
    Ok(())
}

fn run_serve(input: Option<&Path>, snapshot: Option<PathBuf>) -> Result<()> {
    let tree = read_request_tree(input)?;
    let serve = request::parse_serve_input(&tree)?;
    let path = resolve_snapshot_path(snapshot, serve.snapshot_file)?;

    let snapshot = SnapshotFile::read(&path)
        .with_context(|| format!("reading snapshot from {}", path.display()))?;
    let (catalogue, _render, router) = snapshot.restore()?;
    info!(
        path = %path.display(),
        stops = catalogue.stop_count(),
        requests = serve.stat_requests.len(),
        "snapshot loaded"
    );

    let engine = QueryEngine::new(&catalogue, router);
    let answers = engine.execute(&serve.stat_requests)?;
    let stdout = std::io::stdout();
    serde_json::to_writer_pretty(stdout.lock(), &answers).context("writing responses")?;
    println!();
    Ok(())
}
