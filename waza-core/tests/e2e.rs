//! End-to-end scenarios seeding the test suite.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use waza_core::cache::ResultCache;
use waza_core::engine::mock::FailurePattern;
use waza_core::engine::MockEngine;
use waza_core::outcome::TestStatus;
use waza_core::progress::{ProgressBus, ProgressEvent, ProgressEventKind, ProgressListener};
use waza_core::scheduler::Scheduler;
use waza_core::spec::model::{
    EngineKind, ExecutionConfig, ExpectedBehavior, GraderDecl, GraderKind, TaskDefinition,
};
use waza_core::{run_benchmark, BenchmarkSpec, RunOptions, WazaError};

fn base_config(trials: u32, parallel: bool, workers: usize) -> ExecutionConfig {
    ExecutionConfig {
        trials_per_task: trials,
        timeout_seconds: 10,
        parallel,
        workers,
        executor: EngineKind::Mock,
        model: "mock-1".into(),
        skill_paths: vec![],
    }
}

fn spec_with_grader(config: ExecutionConfig, assertion: &str) -> BenchmarkSpec {
    BenchmarkSpec {
        name: "bench".into(),
        skill: "bench-skill".into(),
        version: "1".into(),
        config,
        graders: vec![GraderDecl {
            name: "g1".into(),
            kind: GraderKind::Code,
            config: serde_json::json!({ "assertion": assertion }),
        }],
        tasks: vec![],
    }
}

fn task(id: &str) -> TaskDefinition {
    TaskDefinition {
        id: id.into(),
        name: format!("Task {id}"),
        description: None,
        tags: Default::default(),
        prompt: "Explain this code".into(),
        files: vec![],
        expected: ExpectedBehavior::default(),
        graders: vec![],
        source_path: PathBuf::new(),
    }
}

fn write(dir: &Path, name: &str, contents: &str) {
    std::fs::write(dir.join(name), contents).unwrap();
}

/// Scenario 1: single-task mock happy path.
#[tokio::test]
async fn scenario_single_task_happy_path() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("tasks")).unwrap();
    write(&dir.path().join("tasks"), "t.yaml", "id: t\nname: T\nprompt: Explain this code\n");
    write(
        dir.path(),
        "bench.yaml",
        "name: demo\nskill: demo-skill\nversion: \"1\"\n\
         config:\n  trials_per_task: 1\n  timeout_seconds: 10\n  executor: mock\n  model: mock-1\n\
         graders:\n  - name: nonempty\n    kind: code\n    config:\n      assertion: \"len(output) > 0\"\n\
         tasks:\n  - \"tasks/*.yaml\"\n",
    );

    let options = RunOptions::new(dir.path().join("bench.yaml"), dir.path().join("cache"));
    let outcomes = run_benchmark(options).await.unwrap();
    let outcome = &outcomes[0];

    assert_eq!(outcome.digest.total, 1);
    assert_eq!(outcome.digest.succeeded, 1);
    assert_eq!(outcome.digest.aggregate_score, 1.0);
    assert_eq!(outcome.tests[0].status, TestStatus::Passed);
}

/// Scenario 2: failing grader.
#[tokio::test]
async fn scenario_failing_grader() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(ResultCache::new(dir.path().join("cache")));
    let spec = spec_with_grader(base_config(1, false, 1), "False");
    let scheduler = Scheduler::new(
        spec,
        vec![task("t")],
        Path::new("."),
        Arc::new(MockEngine::default()),
        cache,
        ProgressBus::new(),
    );

    let outcomes = scheduler.run(CancellationToken::new()).await;
    let outcome = &outcomes[0];
    assert_eq!(outcome.status, TestStatus::Failed);
    assert_eq!(outcome.runs[0].graders["g1"].passed, false);
    assert!(outcome.runs[0].graders["g1"].feedback.contains("False"));
}

/// Scenario 3: flaky task.
#[tokio::test]
async fn scenario_flaky_task() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(ResultCache::new(dir.path().join("cache")));
    let spec = spec_with_grader(base_config(4, false, 1), "len(output) > 0");
    let engine = Arc::new(MockEngine::new().with_failure_pattern(FailurePattern::EveryOther));
    let scheduler = Scheduler::new(spec, vec![task("t")], Path::new("."), engine, cache, ProgressBus::new());

    let outcomes = scheduler.run(CancellationToken::new()).await;
    let outcome = &outcomes[0];
    assert_eq!(outcome.stats.pass_rate, 0.5);
    assert!(outcome.stats.flaky);
    assert_eq!(outcome.status, TestStatus::Failed);
    assert!(outcome.stats.ci95_low <= 0.5 && outcome.stats.ci95_high >= 0.5);
}

/// Scenario 4: cache hit short-circuits the engine on the second run.
#[tokio::test]
async fn scenario_cache_hit_skips_engine() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(ResultCache::new(dir.path().join("cache")));
    let spec = spec_with_grader(base_config(1, false, 1), "len(output) > 0");
    let engine = Arc::new(MockEngine::default());

    let scheduler1 = Scheduler::new(spec.clone(), vec![task("t")], Path::new("."), engine.clone(), cache.clone(), ProgressBus::new());
    let first = scheduler1.run(CancellationToken::new()).await;
    assert!(!first[0].from_cache);
    assert_eq!(engine.execution_count(), 1);

    let scheduler2 = Scheduler::new(spec, vec![task("t")], Path::new("."), engine.clone(), cache, ProgressBus::new());
    let second = scheduler2.run(CancellationToken::new()).await;
    assert!(second[0].from_cache);
    assert_eq!(engine.execution_count(), 1, "engine must not be invoked again on a cache hit");
}

/// Scenario 5: a non-deterministic grader bypasses the cache entirely.
#[tokio::test]
async fn scenario_nondeterministic_grader_bypasses_cache() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(ResultCache::new(dir.path().join("cache")));
    let mut spec = spec_with_grader(base_config(1, false, 1), "len(output) > 0");
    spec.graders.push(GraderDecl {
        name: "behavior1".into(),
        kind: GraderKind::Behavior,
        config: serde_json::json!({}),
    });
    let engine = Arc::new(MockEngine::default());

    for _ in 0..2 {
        let scheduler = Scheduler::new(spec.clone(), vec![task("t")], Path::new("."), engine.clone(), cache.clone(), ProgressBus::new());
        let outcomes = scheduler.run(CancellationToken::new()).await;
        assert!(!outcomes[0].from_cache);
    }
    assert_eq!(engine.execution_count(), 2, "engine must run on every call when caching is bypassed");
}

/// Scenario 6: parallel execution preserves spec-declared task order and
/// run-number order within a task.
#[tokio::test]
async fn scenario_parallel_order_stability() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(ResultCache::new(dir.path().join("cache")));
    let spec = spec_with_grader(base_config(3, true, 4), "len(output) > 0");
    let tasks: Vec<TaskDefinition> = ["a", "b", "c", "d"].iter().map(|id| task(id)).collect();
    let ids: Vec<String> = tasks.iter().map(|t| t.id.clone()).collect();

    let scheduler = Scheduler::new(spec, tasks, Path::new("."), Arc::new(MockEngine::default()), cache, ProgressBus::new());
    let outcomes = scheduler.run(CancellationToken::new()).await;

    let got: Vec<String> = outcomes.iter().map(|o| o.task_id.clone()).collect();
    assert_eq!(got, ids);
    for outcome in &outcomes {
        let run_numbers: Vec<u32> = outcome.runs.iter().map(|r| r.run_number).collect();
        assert_eq!(run_numbers, vec![1, 2, 3]);
    }
}

struct CancelAfterNCompletes {
    remaining: std::sync::atomic::AtomicUsize,
    cancel: CancellationToken,
}

#[async_trait]
impl ProgressListener for CancelAfterNCompletes {
    async fn on_event(&self, event: &ProgressEvent) {
        if event.kind == ProgressEventKind::TestComplete {
            let prev = self.remaining.fetch_sub(1, Ordering::SeqCst);
            if prev == 1 {
                self.cancel.cancel();
            }
        }
    }
}

/// Scenario 7: cancelling mid-run yields a well-formed outcome with some
/// tasks completed and the rest marked `na`, and leaves no fixture
/// directories behind (guaranteed here by `FixtureGuard`'s Drop, not by
/// explicit assertion against the filesystem).
#[tokio::test]
async fn scenario_cancellation_mid_run_is_well_formed() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(ResultCache::new(dir.path().join("cache")));
    let spec = spec_with_grader(base_config(5, false, 1), "len(output) > 0");
    let tasks: Vec<TaskDefinition> = ["a", "b", "c"].iter().map(|id| task(id)).collect();

    let cancel = CancellationToken::new();
    let mut progress = ProgressBus::new();
    progress.register(Arc::new(CancelAfterNCompletes {
        remaining: AtomicUsize::new(2),
        cancel: cancel.clone(),
    }));

    let scheduler = Scheduler::new(spec, tasks, Path::new("."), Arc::new(MockEngine::default()), cache, progress);
    let outcomes = scheduler.run(cancel).await;

    assert_eq!(outcomes.len(), 3);
    let na_count = outcomes.iter().filter(|o| o.status == TestStatus::Na).count();
    let completed_count = outcomes.iter().filter(|o| o.status != TestStatus::Na).count();
    assert_eq!(na_count, 1);
    assert_eq!(completed_count, 2);

    let digest = waza_core::stats::StatisticsEngine::compute_digest(&outcomes);
    assert_eq!(digest.na, 1);
    assert_eq!(
        digest.succeeded + digest.failed + digest.errored + digest.na,
        digest.total
    );
}

/// Scenario 8: multi-model runs and duplicate-model rejection.
#[tokio::test]
async fn scenario_multi_model_runs_and_duplicate_rejection() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("tasks")).unwrap();
    write(&dir.path().join("tasks"), "t.yaml", "id: t\nname: T\nprompt: hi\n");
    write(
        dir.path(),
        "bench.yaml",
        "name: demo\nskill: demo-skill\nversion: \"1\"\n\
         config:\n  trials_per_task: 1\n  timeout_seconds: 10\n  executor: mock\n  model: base-model\n\
         tasks:\n  - \"tasks/*.yaml\"\n",
    );

    let mut options = RunOptions::new(dir.path().join("bench.yaml"), dir.path().join("cache"));
    options.models = vec!["model-a".into(), "model-b".into()];
    let outcomes = run_benchmark(options).await.unwrap();
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].setup.model, "model-a");
    assert_eq!(outcomes[1].setup.model, "model-b");

    let mut dup_options = RunOptions::new(dir.path().join("bench.yaml"), dir.path().join("cache2"));
    dup_options.models = vec!["model-a".into(), "model-a".into()];
    let err = run_benchmark(dup_options).await.unwrap_err();
    assert!(matches!(err, WazaError::DuplicateModel(_)));
}
