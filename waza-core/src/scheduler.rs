//! Scheduler: fans out (task, trial) pairs, serially or across a bounded
//! worker pool, enforcing per-trial timeouts and benchmark-wide
//! cancellation. Concurrency is bounded with a `Semaphore`, spawned
//! tasks are collected via `JoinHandle`, and a `CancellationToken`
//! drives graceful shutdown; each trial additionally gets its own
//! panic/timeout isolation so one bad trial can't take down the rest of
//! the run.

use crate::cache::{all_graders_deterministic, CacheKey, ResultCache};
use crate::engine::{EngineAdapter, EngineRequest};
use crate::error::TrialError;
use crate::fixture::FixtureManager;
use crate::grader::GraderRegistry;
use crate::outcome::{RunResult, RunStatus, TestOutcome};
use crate::progress::{ProgressBus, ProgressEvent, ProgressEventKind, TrialStatus};
use crate::spec::model::{BenchmarkSpec, TaskDefinition};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

/// Per-trial lifecycle. Kept as data purely
/// for observability — progress events double as the transition log —
/// rather than driving control flow through an explicit state value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialState {
    Queued,
    Staging,
    Executing,
    Grading,
    Finalizing,
    Done,
    Cancelled,
}

struct SchedulerShared {
    spec: BenchmarkSpec,
    engine: Arc<dyn EngineAdapter>,
    fixtures: FixtureManager,
    cache: Arc<ResultCache>,
    progress: ProgressBus,
}

pub struct Scheduler {
    shared: Arc<SchedulerShared>,
    tasks: Vec<Arc<TaskDefinition>>,
}

impl Scheduler {
    pub fn new(
        spec: BenchmarkSpec,
        tasks: Vec<TaskDefinition>,
        spec_dir: &std::path::Path,
        engine: Arc<dyn EngineAdapter>,
        cache: Arc<ResultCache>,
        progress: ProgressBus,
    ) -> Self {
        let fixtures = FixtureManager::new(&spec, spec_dir);
        let shared = Arc::new(SchedulerShared {
            spec,
            engine,
            fixtures,
            cache,
            progress,
        });
        Self {
            shared,
            tasks: tasks.into_iter().map(Arc::new).collect(),
        }
    }

    /// Run every task to completion (or cancellation). TestOutcomes are
    /// returned in spec-declared task order regardless of completion
    /// order or execution mode.
    #[instrument(skip(self, cancel), fields(tasks = self.tasks.len(), parallel = self.shared.spec.config.parallel))]
    pub async fn run(&self, cancel: CancellationToken) -> Vec<TestOutcome> {
        let total = self.tasks.len();

        self.shared
            .progress
            .emit(ProgressEvent::new(ProgressEventKind::BenchmarkStart, 0, total, &self.shared.spec.name))
            .await;

        let results = if self.shared.spec.config.parallel && self.shared.spec.config.workers > 1 {
            self.run_parallel(total, cancel.clone()).await
        } else {
            self.run_serial(total, cancel.clone()).await
        };

        self.shared
            .progress
            .emit(ProgressEvent::new(ProgressEventKind::BenchmarkComplete, total, total, &self.shared.spec.name))
            .await;

        results
    }

    async fn run_serial(&self, total: usize, cancel: CancellationToken) -> Vec<TestOutcome> {
        let mut out = Vec::with_capacity(self.tasks.len());
        for (index, task) in self.tasks.iter().enumerate() {
            if cancel.is_cancelled() {
                out.push(TestOutcome::na(task.id.clone(), task.name.clone()));
                continue;
            }
            out.push(run_one_task(self.shared.clone(), task.clone(), index, total, cancel.clone()).await);
        }
        out
    }

    /// Worker pool of size `workers` consumes the task list; a task's
    /// own trials then execute sequentially unless the spec enables
    /// trial-level fan-out too (reserved for future use).
    async fn run_parallel(&self, total: usize, cancel: CancellationToken) -> Vec<TestOutcome> {
        let permits = Arc::new(Semaphore::new(self.shared.spec.config.workers));
        let mut handles = Vec::with_capacity(self.tasks.len());

        for (index, task) in self.tasks.iter().cloned().enumerate() {
            let shared = self.shared.clone();
            let permits = permits.clone();
            let cancel = cancel.clone();

            handles.push(tokio::spawn(async move {
                if cancel.is_cancelled() {
                    return (index, TestOutcome::na(task.id.clone(), task.name.clone()));
                }
                // Bounds concurrent task execution the way a bounded work
                // queue would bound concurrent producers: a permit is the
                // queue slot, acquisition is the producer blocking on a
                // full queue.
                let _permit = permits.acquire().await.expect("semaphore not closed");
                (index, run_one_task(shared, task, index, total, cancel).await)
            }));
        }

        let mut indexed = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(pair) => indexed.push(pair),
                Err(e) => {
                    info!(error = %e, "task runner panicked, recording as errored outcome");
                }
            }
        }
        indexed.sort_by_key(|(index, _)| *index);
        indexed.into_iter().map(|(_, outcome)| outcome).collect()
    }
}

async fn run_one_task(
    shared: Arc<SchedulerShared>,
    task: Arc<TaskDefinition>,
    test_index: usize,
    test_total: usize,
    cancel: CancellationToken,
) -> TestOutcome {
    shared
        .progress
        .emit(
            ProgressEvent::new(ProgressEventKind::TestStart, test_index, test_total, &task.name),
        )
        .await;

    let deterministic = all_graders_deterministic(&shared.spec.graders, &task);
    let key = CacheKey::compute(&shared.spec.config, &task, &shared.spec.config.model, &shared.spec.graders);

    let shared_for_build = shared.clone();
    let task_for_build = task.clone();
    let outcome = shared
        .cache
        .get_or_compute(key, deterministic, move || {
            run_task_trials(shared_for_build, task_for_build, test_index, test_total, cancel)
        })
        .await;

    shared
        .progress
        .emit(if outcome.from_cache {
            ProgressEvent::new(ProgressEventKind::TestCached, test_index, test_total, &task.name)
        } else {
            ProgressEvent::new(ProgressEventKind::TestComplete, test_index, test_total, &task.name)
        })
        .await;

    outcome
}

async fn run_task_trials(
    shared: Arc<SchedulerShared>,
    task: Arc<TaskDefinition>,
    test_index: usize,
    test_total: usize,
    cancel: CancellationToken,
) -> TestOutcome {
    let trials = shared.spec.config.trials_per_task;
    let mut runs = Vec::with_capacity(trials as usize);

    for run_number in 1..=trials {
        if cancel.is_cancelled() {
            break;
        }
        let run = run_one_trial(shared.clone(), task.clone(), run_number, test_index, test_total, cancel.clone()).await;
        runs.push(run);
    }

    TestOutcome::assemble(task.id.clone(), task.name.clone(), runs)
}

#[instrument(skip(shared, task, cancel), fields(task_id = %task.id, run_number))]
async fn run_one_trial(
    shared: Arc<SchedulerShared>,
    task: Arc<TaskDefinition>,
    run_number: u32,
    test_index: usize,
    test_total: usize,
    cancel: CancellationToken,
) -> RunResult {
    let start = Instant::now();
    let trial_cancel = cancel.child_token();

    shared
        .progress
        .emit(
            ProgressEvent::new(ProgressEventKind::RunStart, test_index, test_total, &task.name)
                .with_run(run_number)
                .with_status(TrialStatus::Started),
        )
        .await;

    let timeout = Duration::from_secs(shared.spec.config.timeout_seconds);
    let body = AssertUnwindSafe(execute_trial_body(
        shared.clone(),
        task.clone(),
        run_number,
        test_index,
        test_total,
        timeout,
        trial_cancel.clone(),
    ))
    .catch_unwind();

    let outcome = match tokio::time::timeout(timeout, body).await {
        Ok(Ok(result)) => result,
        Ok(Err(_panic)) => trial_error(TrialError::TrialCrash("trial panicked".into())),
        Err(_elapsed) => {
            trial_cancel.cancel();
            trial_error(TrialError::TimeoutExpired(timeout.as_millis() as u64))
        }
    };

    let duration_ms = start.elapsed().as_millis() as u64;
    let mut outcome = outcome;
    outcome.run_number = run_number;
    outcome.duration_ms = duration_ms;

    shared
        .progress
        .emit(
            ProgressEvent::new(ProgressEventKind::RunComplete, test_index, test_total, &task.name)
                .with_run(run_number)
                .with_status(run_status_to_trial_status(outcome.status))
                .with_duration(duration_ms),
        )
        .await;

    outcome
}

#[allow(clippy::too_many_arguments)]
async fn execute_trial_body(
    shared: Arc<SchedulerShared>,
    task: Arc<TaskDefinition>,
    run_number: u32,
    test_index: usize,
    test_total: usize,
    timeout: Duration,
    cancel: CancellationToken,
) -> RunResult {
    let guard = match shared.fixtures.stage(&task) {
        Ok(guard) => guard,
        Err(e) => return trial_error(e),
    };

    let request = EngineRequest {
        prompt: task.prompt.clone(),
        working_dir: guard.path().to_path_buf(),
        model_id: shared.spec.config.model.clone(),
        deadline: Instant::now() + timeout,
        cancel: cancel.clone(),
        run_number,
    };

    shared
        .progress
        .emit(
            ProgressEvent::new(ProgressEventKind::EnginePrompt, test_index, test_total, &task.name)
                .with_run(run_number)
                .with_truncated_detail("prompt", &request.prompt),
        )
        .await;

    let response = match shared.engine.execute(request).await {
        Ok(response) => response,
        Err(e) => return trial_error(TrialError::EngineFailure(e)),
    };

    shared
        .progress
        .emit(
            ProgressEvent::new(ProgressEventKind::EngineResponse, test_index, test_total, &task.name)
                .with_run(run_number)
                .with_status(if response.success { TrialStatus::Passed } else { TrialStatus::Failed })
                .with_truncated_detail("output", &response.output)
                .with_truncated_detail("error", response.error.as_deref().unwrap_or("")),
        )
        .await;

    let graders = GraderRegistry::evaluate(
        &shared.spec.graders,
        &task,
        &response,
        &shared.progress,
        test_index,
        test_total,
        run_number,
    )
    .await;
    let graders: std::collections::HashMap<_, _> = graders.into_iter().collect();
    let status = RunResult::derive_status(response.success, &graders);

    RunResult {
        run_number,
        status,
        duration_ms: 0,
        output: response.output,
        tool_call_count: response.tool_call_count,
        engine_error: response.error,
        graders,
    }
}

fn trial_error(err: TrialError) -> RunResult {
    RunResult {
        run_number: 0,
        status: RunStatus::Error,
        duration_ms: 0,
        output: String::new(),
        tool_call_count: 0,
        engine_error: Some(err.diagnostic()),
        graders: std::collections::HashMap::new(),
    }
}

fn run_status_to_trial_status(status: RunStatus) -> TrialStatus {
    match status {
        RunStatus::Passed => TrialStatus::Passed,
        RunStatus::Failed => TrialStatus::Failed,
        RunStatus::Error => TrialStatus::Error,
    }
}

impl TestOutcome {
    /// A task that never got to run because the benchmark was cancelled
    /// before it started.
    pub fn na(task_id: String, display_name: String) -> Self {
        Self {
            task_id,
            display_name,
            status: crate::outcome::TestStatus::Na,
            runs: vec![],
            stats: crate::stats::StatisticsEngine::compute_test_stats(&[]),
            from_cache: false,
        }
    }
}
