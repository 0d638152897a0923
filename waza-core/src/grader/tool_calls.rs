//! `tool-calls` grader (deterministic): checks the engine's reported
//! tool-call count against the task's `expected.max_tool_calls`, or an
//! explicit `max` in the grader's own config if set.

use super::{Grader, GraderContext, GraderResult};
use crate::spec::model::GraderDecl;
use async_trait::async_trait;

pub struct ToolCallsGrader {
    name: String,
    max_override: Option<u32>,
}

impl ToolCallsGrader {
    pub fn from_decl(decl: &GraderDecl) -> Self {
        let max_override = decl
            .config
            .get("max")
            .and_then(|v| v.as_u64())
            .map(|v| v as u32);
        Self {
            name: decl.name.clone(),
            max_override,
        }
    }
}

#[async_trait]
impl Grader for ToolCallsGrader {
    fn name(&self) -> &str {
        &self.name
    }

    async fn grade(&self, ctx: &GraderContext<'_>) -> GraderResult {
        let max = self
            .max_override
            .or(ctx.task.expected.max_tool_calls);
        let Some(max) = max else {
            return GraderResult {
                score: 1.0,
                passed: true,
                feedback: "no max_tool_calls configured; trivially passed".into(),
            };
        };
        let actual = ctx.response.tool_call_count;
        let passed = actual <= max;
        GraderResult {
            score: if passed { 1.0 } else { 0.0 },
            passed,
            feedback: format!("used {actual} tool calls, max allowed {max}"),
        }
    }
}
