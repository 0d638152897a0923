//! Outcome Assembler: the data model for a completed
//! benchmark run, plus assembly of the final `EvaluationOutcome` from
//! finished `TestOutcome`s and an optional per-task transcript writer.

use crate::grader::GraderResult;
use crate::spec::model::ExecutionConfig;
use crate::stats::{OutcomeDigest, StatisticsEngine, TestStats};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use uuid::Uuid;

/// One invocation of engine+graders for one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub run_number: u32,
    pub status: RunStatus,
    pub duration_ms: u64,
    pub output: String,
    pub tool_call_count: u32,
    pub engine_error: Option<String>,
    pub graders: HashMap<String, GraderResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Passed,
    Failed,
    Error,
}

impl RunResult {
    /// score = mean of grader scores, 0 if no graders.
    pub fn run_score(&self) -> f64 {
        if self.graders.is_empty() {
            return 0.0;
        }
        self.graders.values().map(|g| g.score).sum::<f64>() / self.graders.len() as f64
    }

    /// `status = passed` iff every grader passed AND the engine reported
    /// success.
    pub fn derive_status(engine_success: bool, graders: &HashMap<String, GraderResult>) -> RunStatus {
        if engine_success && graders.values().all(|g| g.passed) {
            RunStatus::Passed
        } else {
            RunStatus::Failed
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Passed,
    Failed,
    Error,
    Na,
}

/// Aggregation over the trial set for one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestOutcome {
    // NOTE: must stay Clone — the result cache hands out independent
    // copies to every concurrent waiter on a shared key.
    pub task_id: String,
    pub display_name: String,
    pub status: TestStatus,
    pub runs: Vec<RunResult>,
    pub stats: TestStats,
    /// True when this outcome was served from the result cache rather
    /// than freshly executed; informational only, never affects equality
    /// of the cached content itself.
    #[serde(default)]
    pub from_cache: bool,
}

impl TestOutcome {
    /// Default pass threshold is strict: every trial must pass.
    pub fn assemble(task_id: String, display_name: String, mut runs: Vec<RunResult>) -> Self {
        runs.sort_by_key(|r| r.run_number);
        let stats = StatisticsEngine::compute_test_stats(&runs);
        let status = if runs.is_empty() {
            TestStatus::Na
        } else if runs.iter().any(|r| r.status == RunStatus::Error) {
            TestStatus::Error
        } else if stats.pass_rate >= 1.0 {
            TestStatus::Passed
        } else {
            TestStatus::Failed
        };
        Self {
            task_id,
            display_name,
            status,
            runs,
            stats,
            from_cache: false,
        }
    }

    pub fn cached(mut self) -> Self {
        self.from_cache = true;
        self
    }
}

/// Root artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationOutcome {
    pub run_id: Uuid,
    pub skill_tested: String,
    pub bench_name: String,
    pub timestamp: DateTime<Utc>,
    pub setup: ExecutionConfig,
    pub digest: OutcomeDigest,
    pub tests: Vec<TestOutcome>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

pub struct OutcomeAssembler;

impl OutcomeAssembler {
    pub fn assemble(
        skill_tested: String,
        bench_name: String,
        setup: ExecutionConfig,
        tests: Vec<TestOutcome>,
    ) -> EvaluationOutcome {
        let digest = StatisticsEngine::compute_digest(&tests);
        EvaluationOutcome {
            run_id: Uuid::new_v4(),
            skill_tested,
            bench_name,
            timestamp: Utc::now(),
            setup,
            digest,
            tests,
            metadata: HashMap::new(),
        }
    }

    /// Write a single task's full RunResult list to `{task_id}.json`
    /// under `dir`.
    pub async fn write_transcript(dir: &Path, outcome: &TestOutcome) -> std::io::Result<()> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!("{}.json", outcome.task_id));
        let body = serde_json::to_vec_pretty(&outcome.runs)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        tokio::fs::write(path, body).await
    }
}
