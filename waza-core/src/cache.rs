//! Content-addressed, at-most-one-build cache of whole `TestOutcome`s.
//! Concurrent builds of the same key are deduplicated in-process before
//! falling back to an on-disk store keyed by the same fingerprint.

use crate::outcome::TestOutcome;
use crate::spec::model::{ExecutionConfig, FileSource, GraderDecl, TaskDefinition};
use dashmap::DashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::warn;

/// Content-addressed fingerprint. Two runs yield an equal key iff every
/// observable input is identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey(u64);

impl CacheKey {
    pub fn compute(
        config: &ExecutionConfig,
        task: &TaskDefinition,
        model_id: &str,
        spec_graders: &[GraderDecl],
    ) -> Self {
        let mut hasher = DefaultHasher::new();

        config.trials_per_task.hash(&mut hasher);
        config.timeout_seconds.hash(&mut hasher);
        config.parallel.hash(&mut hasher);
        // `workers` affects only scheduling throughput, not observable
        // output, so it is deliberately excluded as display-only for
        // caching purposes.
        format!("{:?}", config.executor).hash(&mut hasher);

        model_id.hash(&mut hasher);

        task.id.hash(&mut hasher);
        task.prompt.hash(&mut hasher);
        for tag in {
            let mut t: Vec<&String> = task.tags.iter().collect();
            t.sort();
            t
        } {
            tag.hash(&mut hasher);
        }
        task.expected.output_contains.hash(&mut hasher);
        task.expected.output_not_contains.hash(&mut hasher);
        task.expected.max_tool_calls.hash(&mut hasher);
        task.expected.max_response_time_ms.hash(&mut hasher);

        for file in &task.files {
            file.logical_path.hash(&mut hasher);
            match &file.source {
                FileSource::Inline { content } => content.hash(&mut hasher),
                FileSource::OnDisk { path } => {
                    let resolved = task
                        .source_path
                        .parent()
                        .map(|p| p.join(path))
                        .unwrap_or_else(|| path.clone());
                    match std::fs::read(&resolved) {
                        Ok(bytes) => bytes.hash(&mut hasher),
                        Err(e) => {
                            warn!(path = %resolved.display(), error = %e, "fixture file unreadable while hashing cache key");
                            path.hash(&mut hasher);
                        }
                    }
                }
            }
        }

        for decl in task.effective_graders(spec_graders) {
            hash_grader_decl(decl, &mut hasher);
        }

        Self(hasher.finish())
    }

    fn hex(self) -> String {
        format!("{:016x}", self.0)
    }
}

fn hash_grader_decl(decl: &GraderDecl, hasher: &mut DefaultHasher) {
    decl.name.hash(hasher);
    format!("{:?}", decl.kind).hash(hasher);
    decl.config.to_string().hash(hasher);
}

/// Outcome of an explicit cache-clear call.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClearOutcome {
    pub entries_removed: usize,
}

/// The keyed, at-most-one-build cache. `dir` is the on-disk,
/// content-addressed store; `in_flight` coordinates concurrent builds
/// of the same key within this process so only one actually runs.
pub struct ResultCache {
    dir: PathBuf,
    in_flight: DashMap<CacheKey, Arc<OnceCell<TestOutcome>>>,
}

impl ResultCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            in_flight: DashMap::new(),
        }
    }

    /// Returns a stored TestOutcome if present; otherwise calls `build`
    /// exactly once for this key (across all concurrent callers in this
    /// process) and stores the result. When `deterministic` is false the
    /// cache is bypassed entirely — `build` always runs and nothing is
    /// read from or written to the store.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: CacheKey,
        deterministic: bool,
        build: F,
    ) -> TestOutcome
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = TestOutcome>,
    {
        if !deterministic {
            return build().await.cached_flag_cleared();
        }

        if let Some(hit) = self.read_disk(key).await {
            return hit.cached();
        }

        let cell = self
            .in_flight
            .entry(key)
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let result = cell
            .get_or_init(|| async {
                let outcome = build().await;
                self.write_disk(key, &outcome).await;
                outcome
            })
            .await
            .clone();

        // Drop the in-flight slot once settled so a later, genuinely new
        // build (e.g. after `clear()`) is not served the stale cell.
        self.in_flight.remove(&key);

        result
    }

    async fn read_disk(&self, key: CacheKey) -> Option<TestOutcome> {
        let path = self.entry_path(key);
        let bytes = tokio::fs::read(&path).await.ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "discarding corrupt cache entry");
                let _ = tokio::fs::remove_file(&path).await;
                None
            }
        }
    }

    async fn write_disk(&self, key: CacheKey, outcome: &TestOutcome) {
        if let Err(e) = tokio::fs::create_dir_all(&self.dir).await {
            warn!(error = %e, "could not create cache directory, skipping store");
            return;
        }
        let path = self.entry_path(key);
        match serde_json::to_vec(outcome) {
            Ok(bytes) => {
                if let Err(e) = tokio::fs::write(&path, bytes).await {
                    warn!(path = %path.display(), error = %e, "failed writing cache entry");
                }
            }
            Err(e) => warn!(error = %e, "failed encoding cache entry"),
        }
    }

    fn entry_path(&self, key: CacheKey) -> PathBuf {
        self.dir.join(format!("{}.json", key.hex()))
    }

    /// Remove every stored entry. Never benchmark-fatal on its own; a
    /// failure to remove an individual file is logged and skipped, but an
    /// I/O error enumerating the directory itself is reported so a caller
    /// can surface `CacheCorruption` if it chooses to.
    pub async fn clear(&self) -> std::io::Result<ClearOutcome> {
        self.in_flight.clear();
        let mut removed = 0usize;
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ClearOutcome { entries_removed: 0 })
            }
            Err(e) => return Err(e),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if tokio::fs::remove_file(&path).await.is_ok() {
                    removed += 1;
                }
            }
        }
        Ok(ClearOutcome { entries_removed: removed })
    }
}

impl TestOutcome {
    fn cached_flag_cleared(mut self) -> Self {
        self.from_cache = false;
        self
    }
}

/// True iff every grader declared for a task (spec + task overrides) is
/// deterministic; used to decide cache bypass.
pub fn all_graders_deterministic(spec_graders: &[GraderDecl], task: &TaskDefinition) -> bool {
    task.effective_graders(spec_graders)
        .iter()
        .all(|g| g.kind.is_deterministic())
}
