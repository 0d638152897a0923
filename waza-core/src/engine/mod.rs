//! Engine Adapter: a single capability set uniform over
//! model backends. Adapter errors become `TrialError::EngineFailure` and
//! are never benchmark-fatal.

pub mod mock;
pub mod real;

pub use mock::MockEngine;
pub use real::CopilotSdkEngine;

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Request carried into one engine invocation.
#[derive(Debug, Clone)]
pub struct EngineRequest {
    pub prompt: String,
    pub working_dir: PathBuf,
    pub model_id: String,
    pub deadline: Instant,
    pub cancel: CancellationToken,
    /// 1-based run number within the task's trial set. Real backends may
    /// ignore this; the mock engine uses it to produce reproducible
    /// per-run behavior (e.g. flaky-task simulation in tests).
    pub run_number: u32,
}

/// Response produced by one engine invocation.
#[derive(Debug, Clone)]
pub struct EngineResponse {
    pub output: String,
    pub tool_call_count: u32,
    pub success: bool,
    pub error: Option<String>,
}

impl EngineResponse {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            output: String::new(),
            tool_call_count: 0,
            success: false,
            error: Some(error.into()),
        }
    }
}

/// The core's contract with model backends (mock or real). Treated
/// identically by the scheduler regardless of which variant backs it.
#[async_trait]
pub trait EngineAdapter: Send + Sync {
    async fn initialize(&self) -> Result<(), String> {
        Ok(())
    }

    async fn execute(&self, request: EngineRequest) -> Result<EngineResponse, String>;

    async fn shutdown(&self) -> Result<(), String> {
        Ok(())
    }
}
