//! Command-line runner for waza-core benchmarks.

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use waza_core::progress::{ProgressBus, ProgressEvent, ProgressListener};
use waza_core::{RunOptions, TaskFilter};

#[derive(Parser)]
#[command(name = "waza")]
#[command(about = "Local evaluation harness for agent skills", long_about = None)]
struct Cli {
    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Directory holding cached TestOutcomes
    #[arg(long, default_value = "./.waza-cache")]
    cache_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a benchmark spec and emit the resulting outcome(s) as JSON
    Run {
        /// Path to the benchmark spec YAML file
        spec: PathBuf,

        /// Run against one or more model ids instead of the spec's default
        #[arg(long = "model")]
        models: Vec<String>,

        /// Only run tasks matching this id/name glob
        #[arg(long)]
        name_glob: Option<String>,

        /// Only run tasks carrying at least one of these tags
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Write per-task transcripts (full RunResult list) into this directory
        #[arg(long)]
        transcript_dir: Option<PathBuf>,

        /// Print each progress event to stderr as it is emitted
        #[arg(long)]
        progress: bool,
    },

    /// Delete every entry from the result cache
    ClearCache,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    match cli.command {
        Commands::Run {
            spec,
            models,
            name_glob,
            tags,
            transcript_dir,
            progress,
        } => run(&cli.cache_dir, spec, models, name_glob, tags, transcript_dir, progress).await,
        Commands::ClearCache => clear_cache(&cli.cache_dir).await,
    }
}

async fn run(
    cache_dir: &std::path::Path,
    spec: PathBuf,
    models: Vec<String>,
    name_glob: Option<String>,
    tags: Vec<String>,
    transcript_dir: Option<PathBuf>,
    print_progress: bool,
) -> Result<()> {
    let mut options = RunOptions::new(spec.clone(), cache_dir);
    options.models = models;
    options.filter = TaskFilter {
        name_glob,
        tags: tags.into_iter().collect(),
    };
    options.transcript_dir = transcript_dir;
    if print_progress {
        options.progress.register(Arc::new(StderrProgressLogger));
    }

    info!(spec = %spec.display(), "running benchmark");
    let outcomes = waza_core::run_benchmark(options)
        .await
        .with_context(|| format!("running spec {}", spec.display()))?;

    let body = serde_json::to_string_pretty(&outcomes).context("encoding outcomes as JSON")?;
    println!("{body}");
    Ok(())
}

async fn clear_cache(cache_dir: &std::path::Path) -> Result<()> {
    let outcome = waza_core::clear_cache(cache_dir)
        .await
        .with_context(|| format!("clearing cache at {}", cache_dir.display()))?;
    println!("removed {} cache entries", outcome.entries_removed);
    Ok(())
}

struct StderrProgressLogger;

#[async_trait]
impl ProgressListener for StderrProgressLogger {
    async fn on_event(&self, event: &ProgressEvent) {
        eprintln!(
            "[{:?}] {} ({}/{})",
            event.kind, event.test_name, event.test_index + 1, event.test_total
        );
    }
}
