//! `regex` grader (deterministic): matches a pattern against the engine
//! output. Config: `{ "pattern": "...", "should_match": true }`.

use super::{Grader, GraderContext, GraderResult};
use crate::spec::model::GraderDecl;
use async_trait::async_trait;

pub struct RegexGrader {
    name: String,
    pattern: String,
    should_match: bool,
}

impl RegexGrader {
    pub fn from_decl(decl: &GraderDecl) -> Self {
        let pattern = decl
            .config
            .get("pattern")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let should_match = decl
            .config
            .get("should_match")
            .and_then(|v| v.as_bool())
            .unwrap_or(true);
        Self {
            name: decl.name.clone(),
            pattern,
            should_match,
        }
    }
}

#[async_trait]
impl Grader for RegexGrader {
    fn name(&self) -> &str {
        &self.name
    }

    async fn grade(&self, ctx: &GraderContext<'_>) -> GraderResult {
        let re = match regex::Regex::new(&self.pattern) {
            Ok(re) => re,
            Err(e) => return GraderResult::failed(format!("invalid pattern: {e}")),
        };
        let matched = re.is_match(&ctx.response.output);
        let passed = matched == self.should_match;
        GraderResult {
            score: if passed { 1.0 } else { 0.0 },
            passed,
            feedback: if passed {
                format!("pattern `{}` matched as expected", self.pattern)
            } else {
                format!(
                    "pattern `{}` {} output, expected should_match={}",
                    self.pattern,
                    if matched { "matched" } else { "did not match" },
                    self.should_match
                )
            },
        }
    }
}
