//! Deterministic mock engine: the control plane for tests.

use super::{EngineAdapter, EngineRequest, EngineResponse};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};

/// Which run numbers (1-based) the mock engine should report as failed.
/// `Never` and `EveryOther` cover happy-path and flaky-task scenarios;
/// `Explicit` lets tests pick arbitrary run numbers.
#[derive(Debug, Clone)]
pub enum FailurePattern {
    Never,
    EveryOther,
    Explicit(Vec<u32>),
}

impl FailurePattern {
    fn fails(&self, run_number: u32) -> bool {
        match self {
            FailurePattern::Never => false,
            FailurePattern::EveryOther => run_number % 2 == 0,
            FailurePattern::Explicit(runs) => runs.contains(&run_number),
        }
    }
}

/// Deterministic engine whose output is a fixed pattern derived from the
/// prompt. Never talks to a network; used as the control plane for the
/// test suite and for `Cache` round-trip tests that must be byte-stable.
pub struct MockEngine {
    failure_pattern: FailurePattern,
    executions: AtomicU64,
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            failure_pattern: FailurePattern::Never,
            executions: AtomicU64::new(0),
        }
    }

    pub fn with_failure_pattern(mut self, pattern: FailurePattern) -> Self {
        self.failure_pattern = pattern;
        self
    }

    /// Number of times [`execute`](EngineAdapter::execute) has actually run.
    /// Used to assert the cache short-circuits the engine on a hit.
    pub fn execution_count(&self) -> u64 {
        self.executions.load(Ordering::SeqCst)
    }

    fn deterministic_output(prompt: &str) -> String {
        format!(
            "Acknowledged prompt of {} characters. Summary: {}",
            prompt.len(),
            prompt.chars().take(64).collect::<String>()
        )
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EngineAdapter for MockEngine {
    async fn execute(&self, request: EngineRequest) -> Result<EngineResponse, String> {
        self.executions.fetch_add(1, Ordering::SeqCst);

        if request.cancel.is_cancelled() {
            return Ok(EngineResponse::failed("cancelled before execution"));
        }

        if self.failure_pattern.fails(request.run_number) {
            return Ok(EngineResponse {
                output: String::new(),
                tool_call_count: 0,
                success: false,
                error: Some(format!(
                    "mock engine configured to fail run {}",
                    request.run_number
                )),
            });
        }

        Ok(EngineResponse {
            output: Self::deterministic_output(&request.prompt),
            tool_call_count: 1,
            success: true,
            error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::{Duration, Instant};
    use tokio_util::sync::CancellationToken;

    fn request(run_number: u32) -> EngineRequest {
        EngineRequest {
            prompt: "Explain this code".into(),
            working_dir: PathBuf::from("."),
            model_id: "mock-1".into(),
            deadline: Instant::now() + Duration::from_secs(30),
            cancel: CancellationToken::new(),
            run_number,
        }
    }

    #[tokio::test]
    async fn deterministic_for_same_prompt() {
        let engine = MockEngine::new();
        let a = engine.execute(request(1)).await.unwrap();
        let b = engine.execute(request(2)).await.unwrap();
        assert_eq!(a.output, b.output);
    }

    #[tokio::test]
    async fn every_other_failure_pattern() {
        let engine = MockEngine::new().with_failure_pattern(FailurePattern::EveryOther);
        let r1 = engine.execute(request(1)).await.unwrap();
        let r2 = engine.execute(request(2)).await.unwrap();
        let r3 = engine.execute(request(3)).await.unwrap();
        assert!(r1.success);
        assert!(!r2.success);
        assert!(r3.success);
    }

    #[tokio::test]
    async fn counts_executions() {
        let engine = MockEngine::new();
        engine.execute(request(1)).await.unwrap();
        engine.execute(request(2)).await.unwrap();
        assert_eq!(engine.execution_count(), 2);
    }
}
