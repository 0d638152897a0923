//! `human` grader (non-deterministic): defers to a person. Outside a live
//! review UI the only input available is a pre-recorded verdict in the
//! grader's config, used for replaying a past review or for tests;
//! absent that, the trial is reported as awaiting review rather than
//! guessed at.

use super::{Grader, GraderContext, GraderResult};
use crate::spec::model::GraderDecl;
use async_trait::async_trait;

pub struct HumanGrader {
    name: String,
    recorded_verdict: Option<GraderResult>,
}

impl HumanGrader {
    pub fn from_decl(decl: &GraderDecl) -> Self {
        let recorded_verdict = decl.config.get("verdict").map(|v| GraderResult {
            score: v.get("score").and_then(|s| s.as_f64()).unwrap_or(0.0),
            passed: v.get("passed").and_then(|s| s.as_bool()).unwrap_or(false),
            feedback: v
                .get("feedback")
                .and_then(|s| s.as_str())
                .unwrap_or("")
                .to_string(),
        });
        Self {
            name: decl.name.clone(),
            recorded_verdict,
        }
    }
}

#[async_trait]
impl Grader for HumanGrader {
    fn name(&self) -> &str {
        &self.name
    }

    async fn grade(&self, _ctx: &GraderContext<'_>) -> GraderResult {
        match &self.recorded_verdict {
            Some(result) => result.clone(),
            None => GraderResult::failed("awaiting human review: no recorded verdict supplied"),
        }
    }
}
