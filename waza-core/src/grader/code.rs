//! `code` grader (deterministic): evaluates a small boolean-assertion
//! expression language against the engine's output. Config schema:
//! `{ "assertion": "len(output) > 0" }`.

use super::{Grader, GraderContext, GraderResult};
use crate::spec::model::GraderDecl;
use async_trait::async_trait;

pub struct CodeGrader {
    name: String,
    assertion: String,
}

impl CodeGrader {
    pub fn from_decl(decl: &GraderDecl) -> Self {
        let assertion = decl
            .config
            .get("assertion")
            .and_then(|v| v.as_str())
            .unwrap_or("False")
            .to_string();
        Self {
            name: decl.name.clone(),
            assertion,
        }
    }
}

#[async_trait]
impl Grader for CodeGrader {
    fn name(&self) -> &str {
        &self.name
    }

    async fn grade(&self, ctx: &GraderContext<'_>) -> GraderResult {
        match eval_assertion(&self.assertion, &ctx.response.output, &ctx.task.prompt) {
            Ok(true) => GraderResult {
                score: 1.0,
                passed: true,
                feedback: format!("assertion `{}` passed", self.assertion),
            },
            Ok(false) => GraderResult {
                score: 0.0,
                passed: false,
                feedback: format!("assertion `{}` evaluated to False", self.assertion),
            },
            Err(e) => GraderResult::failed(format!(
                "could not evaluate assertion `{}`: {e}",
                self.assertion
            )),
        }
    }
}

/// Evaluates one of a small set of supported assertion shapes against
/// `output` and `input`. Anything more elaborate than a single
/// `fn(args) <op> literal` comparison or a bare boolean literal is
/// rejected rather than guessed at.
fn eval_assertion(assertion: &str, output: &str, input: &str) -> Result<bool, String> {
    let expr = assertion.trim();

    match expr {
        "True" => return Ok(true),
        "False" => return Ok(false),
        _ => {}
    }

    for op in ["==", "!=", ">=", "<=", ">", "<"] {
        if let Some((lhs, rhs)) = split_once_op(expr, op) {
            let lhs_val = eval_term(lhs.trim(), output, input)?;
            let rhs_val: f64 = rhs
                .trim()
                .parse()
                .map_err(|_| format!("right-hand side '{}' is not numeric", rhs.trim()))?;
            return Ok(match op {
                "==" => lhs_val == rhs_val,
                "!=" => lhs_val != rhs_val,
                ">=" => lhs_val >= rhs_val,
                "<=" => lhs_val <= rhs_val,
                ">" => lhs_val > rhs_val,
                "<" => lhs_val < rhs_val,
                _ => unreachable!(),
            });
        }
    }

    if let Some(inner) = expr.strip_prefix("contains(").and_then(|s| s.strip_suffix(')')) {
        let mut parts = inner.splitn(2, ',');
        let target = parts.next().unwrap_or("").trim();
        let needle = parts
            .next()
            .ok_or_else(|| "contains() requires two arguments".to_string())?
            .trim()
            .trim_matches('"');
        let haystack = resolve_identifier(target, output, input)?;
        return Ok(haystack.contains(needle));
    }

    Err(format!("unsupported assertion shape: {expr}"))
}

fn split_once_op<'a>(expr: &'a str, op: &str) -> Option<(&'a str, &'a str)> {
    // Avoid matching the '=' inside '==' when scanning for '>' / '<'
    // alone, and avoid matching '>=' as '>' followed by '='.
    if op == ">" || op == "<" {
        if expr.contains(&format!("{op}=")) {
            return None;
        }
    }
    expr.split_once(op)
}

fn eval_term(term: &str, output: &str, input: &str) -> Result<f64, String> {
    if let Some(inner) = term.strip_prefix("len(").and_then(|s| s.strip_suffix(')')) {
        let value = resolve_identifier(inner.trim(), output, input)?;
        return Ok(value.len() as f64);
    }
    term.parse::<f64>()
        .map_err(|_| format!("unsupported term: {term}"))
}

fn resolve_identifier<'a>(name: &str, output: &'a str, input: &'a str) -> Result<&'a str, String> {
    match name {
        "output" => Ok(output),
        "input" | "prompt" => Ok(input),
        other => Err(format!("unknown identifier: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineResponse;
    use crate::spec::model::{ExpectedBehavior, TaskDefinition};
    use std::collections::HashSet;
    use std::path::PathBuf;

    fn decl(assertion: &str) -> GraderDecl {
        GraderDecl {
            name: "g1".into(),
            kind: crate::spec::model::GraderKind::Code,
            config: serde_json::json!({ "assertion": assertion }),
        }
    }

    fn task() -> TaskDefinition {
        TaskDefinition {
            id: "t1".into(),
            name: "T1".into(),
            description: None,
            tags: HashSet::new(),
            prompt: "Explain this code".into(),
            files: vec![],
            expected: ExpectedBehavior::default(),
            graders: vec![],
            source_path: PathBuf::new(),
        }
    }

    #[tokio::test]
    async fn len_greater_than_zero_passes_on_nonempty_output() {
        let grader = CodeGrader::from_decl(&decl("len(output) > 0"));
        let task = task();
        let response = EngineResponse {
            output: "hello".into(),
            tool_call_count: 0,
            success: true,
            error: None,
        };
        let ctx = GraderContext {
            task: &task,
            response: &response,
        };
        let result = grader.grade(&ctx).await;
        assert!(result.passed);
        assert_eq!(result.score, 1.0);
    }

    #[tokio::test]
    async fn literal_false_always_fails() {
        let grader = CodeGrader::from_decl(&decl("False"));
        let task = task();
        let response = EngineResponse {
            output: "anything".into(),
            tool_call_count: 0,
            success: true,
            error: None,
        };
        let ctx = GraderContext {
            task: &task,
            response: &response,
        };
        let result = grader.grade(&ctx).await;
        assert!(!result.passed);
        assert!(result.feedback.contains("False"));
    }

    #[tokio::test]
    async fn contains_checks_substring() {
        let grader = CodeGrader::from_decl(&decl(r#"contains(output, "hello")"#));
        let task = task();
        let response = EngineResponse {
            output: "hello world".into(),
            tool_call_count: 0,
            success: true,
            error: None,
        };
        let ctx = GraderContext {
            task: &task,
            response: &response,
        };
        assert!(grader.grade(&ctx).await.passed);
    }
}
