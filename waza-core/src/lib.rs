//! Concurrent evaluation orchestrator for agent-skill benchmarks.
//!
//! The crate wires together a spec loader, a fixture manager, an engine
//! adapter, a grader registry, a content-addressed result cache, a
//! scheduler, a statistics engine, a progress bus, and an outcome
//! assembler into a single `run_benchmark` entry point. Every component
//! is independently usable; `lib.rs` only owns the composition.

pub mod cache;
pub mod decimal;
pub mod engine;
pub mod error;
pub mod fixture;
pub mod grader;
pub mod multiplexer;
pub mod outcome;
pub mod progress;
pub mod scheduler;
pub mod spec;
pub mod stats;

pub use cache::{ClearOutcome, ResultCache};
pub use error::{TrialError, WazaError, WazaResult};
pub use outcome::EvaluationOutcome;
pub use progress::{ProgressBus, ProgressEvent, ProgressEventKind};
pub use spec::model::{BenchmarkSpec, TaskDefinition, TaskFilter};

use crate::engine::{CopilotSdkEngine, EngineAdapter, MockEngine};
use crate::multiplexer::{attach_recommendation, resolve_model_ids, HighestAggregateScore, RecommendationHook};
use crate::outcome::OutcomeAssembler;
use crate::scheduler::Scheduler;
use crate::spec::model::EngineKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Everything a caller supplies to run a benchmark once, possibly across
/// several models.
pub struct RunOptions {
    pub spec_path: PathBuf,
    pub filter: TaskFilter,
    /// Model ids to run against. Empty means "use the spec's declared
    /// model"; one or more overrides trigger the multiplexer.
    pub models: Vec<String>,
    pub cache_dir: PathBuf,
    pub transcript_dir: Option<PathBuf>,
    pub cancel: CancellationToken,
    pub progress: ProgressBus,
}

impl RunOptions {
    pub fn new(spec_path: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            spec_path: spec_path.into(),
            filter: TaskFilter::default(),
            models: vec![],
            cache_dir: cache_dir.into(),
            transcript_dir: None,
            cancel: CancellationToken::new(),
            progress: ProgressBus::new(),
        }
    }
}

/// Load the spec once, run it for every resolved model id, and (when more
/// than one model ran) attach a recommendation to each outcome's
/// metadata. This is the crate's single public entry point; `waza-cli`
/// is a thin wrapper over it.
#[instrument(skip(options), fields(spec = %options.spec_path.display()))]
pub async fn run_benchmark(options: RunOptions) -> WazaResult<Vec<EvaluationOutcome>> {
    let (spec, tasks) = spec::loader::load(&options.spec_path, &options.filter)?;
    let spec_dir = options
        .spec_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let model_ids = resolve_model_ids(&spec.config.model, &options.models)?;
    let cache = Arc::new(ResultCache::new(&options.cache_dir));

    let mut outcomes = Vec::with_capacity(model_ids.len());
    for model_id in &model_ids {
        let mut run_config = spec.clone();
        run_config.config.model = model_id.clone();

        let engine = build_engine(run_config.config.executor);
        let scheduler = Scheduler::new(
            run_config.clone(),
            tasks.clone(),
            &spec_dir,
            engine,
            cache.clone(),
            options.progress.clone(),
        );

        let tests = scheduler.run(options.cancel.clone()).await;

        if let Some(dir) = &options.transcript_dir {
            for test in &tests {
                if let Err(e) = OutcomeAssembler::write_transcript(dir, test).await {
                    tracing::warn!(task_id = %test.task_id, error = %e, "failed writing transcript");
                }
            }
        }

        outcomes.push(OutcomeAssembler::assemble(
            spec.skill.clone(),
            spec.name.clone(),
            run_config.config,
            tests,
        ));
    }

    if outcomes.len() > 1 {
        attach_recommendation(&mut outcomes, &HighestAggregateScore);
    }

    Ok(outcomes)
}

/// Stand-alone cache-clear operation exposed to the CLI (`waza --clear-cache`).
pub async fn clear_cache(cache_dir: &Path) -> WazaResult<ClearOutcome> {
    let cache = ResultCache::new(cache_dir);
    cache
        .clear()
        .await
        .map_err(|e| WazaError::CacheCorruption(e.to_string()))
}

fn build_engine(kind: EngineKind) -> Arc<dyn EngineAdapter> {
    match kind {
        EngineKind::Mock => Arc::new(MockEngine::default()),
        EngineKind::CopilotSdk => Arc::new(CopilotSdkEngine::new("http://localhost:4891")),
    }
}
