//! `prompt` grader (non-deterministic): LLM-as-judge. The default judge
//! is a heuristic stand-in (no network dependency in the core); a real
//! deployment supplies its own [`Judge`] implementation over whatever
//! model it chooses.

use super::{Grader, GraderContext, GraderResult};
use crate::spec::model::GraderDecl;
use async_trait::async_trait;

/// A judge that scores a (criterion, output) pair. Kept as a trait so a
/// caller can inject a real LLM-backed judge; the core ships only the
/// heuristic default.
#[async_trait]
pub trait Judge: Send + Sync {
    async fn judge(&self, criterion: &str, prompt: &str, output: &str) -> (f64, String);
}

pub struct HeuristicJudge;

#[async_trait]
impl Judge for HeuristicJudge {
    async fn judge(&self, criterion: &str, prompt: &str, output: &str) -> (f64, String) {
        let length_component = (output.len() as f64 / 400.0).min(1.0);
        let mentions_criterion = output.to_lowercase().contains(&criterion.to_lowercase());
        let on_topic = prompt
            .split_whitespace()
            .filter(|w| w.len() > 4)
            .any(|w| output.to_lowercase().contains(&w.to_lowercase()));

        let mut score: f64 = 0.4 + length_component * 0.3;
        if mentions_criterion {
            score += 0.15;
        }
        if on_topic {
            score += 0.15;
        }
        let score = score.clamp(0.0, 1.0);
        (
            score,
            format!("heuristic judge score for '{criterion}': {score:.2}"),
        )
    }
}

pub struct PromptGrader {
    name: String,
    criterion: String,
    pass_threshold: f64,
    judge: Box<dyn Judge>,
}

impl PromptGrader {
    pub fn from_decl(decl: &GraderDecl) -> Self {
        let criterion = decl
            .config
            .get("criterion")
            .and_then(|v| v.as_str())
            .unwrap_or("overall quality")
            .to_string();
        let pass_threshold = decl
            .config
            .get("pass_threshold")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.6);
        Self {
            name: decl.name.clone(),
            criterion,
            pass_threshold,
            judge: Box::new(HeuristicJudge),
        }
    }

    pub fn with_judge(mut self, judge: Box<dyn Judge>) -> Self {
        self.judge = judge;
        self
    }
}

#[async_trait]
impl Grader for PromptGrader {
    fn name(&self) -> &str {
        &self.name
    }

    async fn grade(&self, ctx: &GraderContext<'_>) -> GraderResult {
        let (score, feedback) = self
            .judge
            .judge(&self.criterion, &ctx.task.prompt, &ctx.response.output)
            .await;
        GraderResult {
            score,
            passed: score >= self.pass_threshold,
            feedback,
        }
    }
}
