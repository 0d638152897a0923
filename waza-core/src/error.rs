//! Error taxonomy for the evaluation orchestrator.
//!
//! Two families exist, matching the split in the design: pre-run failures
//! that abort the whole benchmark, and per-trial failures that are
//! captured into a `RunResult` and never propagate further.

use thiserror::Error;

/// Fatal errors. Only these abort a benchmark outright; everything else
/// is isolated to the offending trial (see [`TrialError`]).
#[derive(Debug, Error)]
pub enum WazaError {
    #[error("spec invalid: {0}")]
    SpecInvalid(String),

    #[error("no tasks selected after filtering")]
    NoTasksSelected,

    #[error("cache store corrupted while flushing: {0}")]
    CacheCorruption(String),

    #[error("duplicate model id in multi-model run: {0}")]
    DuplicateModel(String),

    #[error("caller misuse: {0}")]
    Misuse(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type WazaResult<T> = Result<T, WazaError>;

/// Per-trial failure kinds. These never abort a benchmark; they are
/// captured into the trial's `RunResult` (status = error) or, for
/// `GraderFailure`, into the offending grader's slot while the rest of
/// the trial's graders still run.
#[derive(Debug, Error, Clone)]
pub enum TrialError {
    #[error("fixture staging failed: {0}")]
    FixtureStagingFailed(String),

    #[error("engine failure: {0}")]
    EngineFailure(String),

    #[error("grader failure ({grader}): {reason}")]
    GraderFailure { grader: String, reason: String },

    #[error("trial timed out after {0}ms")]
    TimeoutExpired(u64),

    #[error("trial crashed: {0}")]
    TrialCrash(String),

    #[error("trial cancelled")]
    Cancelled,
}

impl TrialError {
    /// Short diagnostic string suitable for a grader feedback slot or
    /// RunResult error message.
    pub fn diagnostic(&self) -> String {
        self.to_string()
    }
}
