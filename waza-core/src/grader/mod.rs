//! Grader Registry: pluggable validators returning a normalized
//! score/pass/feedback triple. Grader kind is a closed tagged union —
//! each kind's `config` is parsed by the implementation that owns its
//! schema.

pub mod behavior;
pub mod code;
pub mod human;
pub mod prompt;
pub mod registry;
pub mod regex_grader;
pub mod script;
pub mod tool_calls;

pub use registry::GraderRegistry;

use crate::engine::EngineResponse;
use crate::spec::model::{GraderDecl, TaskDefinition};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Normalized output of one grader invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraderResult {
    #[serde(serialize_with = "crate::decimal::six_digit")]
    pub score: f64,
    pub passed: bool,
    pub feedback: String,
}

impl GraderResult {
    pub fn failed(feedback: impl Into<String>) -> Self {
        Self {
            score: 0.0,
            passed: false,
            feedback: feedback.into(),
        }
    }
}

/// Everything a grader needs to judge one trial.
pub struct GraderContext<'a> {
    pub task: &'a TaskDefinition,
    pub response: &'a EngineResponse,
}

/// A single grader. Implementations must never propagate failures as
/// `Err` — a grader that would crash instead returns a `GraderResult`
/// with `score = 0.0`, `passed = false`, and diagnostic feedback.
#[async_trait]
pub trait Grader: Send + Sync {
    fn name(&self) -> &str;
    async fn grade(&self, ctx: &GraderContext<'_>) -> GraderResult;
}

/// Build the concrete grader implementation for a declaration.
pub fn build_grader(decl: &GraderDecl) -> Box<dyn Grader> {
    use crate::spec::model::GraderKind;
    match decl.kind {
        GraderKind::Code => Box::new(code::CodeGrader::from_decl(decl)),
        GraderKind::Regex => Box::new(regex_grader::RegexGrader::from_decl(decl)),
        GraderKind::ToolCalls => Box::new(tool_calls::ToolCallsGrader::from_decl(decl)),
        GraderKind::Script => Box::new(script::ScriptGrader::from_decl(decl)),
        GraderKind::Behavior => Box::new(behavior::BehaviorGrader::from_decl(decl)),
        GraderKind::Prompt => Box::new(prompt::PromptGrader::from_decl(decl)),
        GraderKind::Human => Box::new(human::HumanGrader::from_decl(decl)),
    }
}
