use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::path::PathBuf;
use tokio::runtime::Runtime;
use waza_core::cache::{CacheKey, ResultCache};
use waza_core::outcome::TestOutcome;
use waza_core::spec::model::{EngineKind, ExecutionConfig, ExpectedBehavior, TaskDefinition};

fn config() -> ExecutionConfig {
    ExecutionConfig {
        trials_per_task: 1,
        timeout_seconds: 30,
        parallel: false,
        workers: 1,
        executor: EngineKind::Mock,
        model: "mock-1".into(),
        skill_paths: vec![],
    }
}

fn task(id: &str) -> TaskDefinition {
    TaskDefinition {
        id: id.into(),
        name: id.into(),
        description: None,
        tags: Default::default(),
        prompt: "Explain this code".into(),
        files: vec![],
        expected: ExpectedBehavior::default(),
        graders: vec![],
        source_path: PathBuf::new(),
    }
}

fn bench_cache_key_compute(c: &mut Criterion) {
    let cfg = config();
    let t = task("t1");
    c.bench_function("cache_key_compute", |b| {
        b.iter(|| black_box(CacheKey::compute(&cfg, &t, "mock-1", &[])));
    });
}

fn bench_cache_hit_path(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let cache = ResultCache::new(dir.path());
    let cfg = config();
    let t = task("t1");
    let key = CacheKey::compute(&cfg, &t, "mock-1", &[]);

    rt.block_on(cache.get_or_compute(key, true, || async {
        TestOutcome::assemble("t1".into(), "t1".into(), vec![])
    }));

    c.bench_function("cache_hit_read", |b| {
        b.iter(|| {
            rt.block_on(cache.get_or_compute(black_box(key), true, || async {
                unreachable!("should be served from cache")
            }))
        });
    });
}

criterion_group!(benches, bench_cache_key_compute, bench_cache_hit_path);
criterion_main!(benches);
