//! `script` grader: spawns an external program, feeds it context JSON on
//! stdin, and expects `{score, passed, feedback}` on stdout within a
//! subprocess timeout. Exit code is
//! informational only — only stdout shape determines the result.

use super::{Grader, GraderContext, GraderResult};
use crate::spec::model::GraderDecl;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::warn;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub struct ScriptGrader {
    name: String,
    command: String,
    args: Vec<String>,
    timeout: Duration,
    config: serde_json::Value,
}

#[derive(Serialize)]
struct ScriptInput<'a> {
    task: ScriptTask<'a>,
    response: ScriptResponse<'a>,
    config: &'a serde_json::Value,
}

#[derive(Serialize)]
struct ScriptTask<'a> {
    id: &'a str,
    prompt: &'a str,
}

#[derive(Serialize)]
struct ScriptResponse<'a> {
    output: &'a str,
    tool_call_count: u32,
    success: bool,
}

#[derive(Deserialize)]
struct ScriptOutput {
    score: f64,
    passed: bool,
    feedback: String,
}

impl ScriptGrader {
    pub fn from_decl(decl: &GraderDecl) -> Self {
        let command = decl
            .config
            .get("command")
            .and_then(|v| v.as_str())
            .unwrap_or("true")
            .to_string();
        let args = decl
            .config
            .get("args")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();
        let timeout = decl
            .config
            .get("timeout_secs")
            .and_then(|v| v.as_u64())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        Self {
            name: decl.name.clone(),
            command,
            args,
            timeout,
            config: decl.config.clone(),
        }
    }
}

#[async_trait]
impl Grader for ScriptGrader {
    fn name(&self) -> &str {
        &self.name
    }

    async fn grade(&self, ctx: &GraderContext<'_>) -> GraderResult {
        let input = ScriptInput {
            task: ScriptTask {
                id: &ctx.task.id,
                prompt: &ctx.task.prompt,
            },
            response: ScriptResponse {
                output: &ctx.response.output,
                tool_call_count: ctx.response.tool_call_count,
                success: ctx.response.success,
            },
            config: &self.config,
        };
        let payload = match serde_json::to_vec(&input) {
            Ok(p) => p,
            Err(e) => return GraderResult::failed(format!("could not encode script input: {e}")),
        };

        let run = self.run_once(payload);
        match tokio::time::timeout(self.timeout, run).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => GraderResult::failed(e),
            Err(_) => GraderResult::failed(format!(
                "script grader timed out after {}s",
                self.timeout.as_secs()
            )),
        }
    }
}

impl ScriptGrader {
    async fn run_once(&self, payload: Vec<u8>) -> Result<GraderResult, String> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| format!("failed to spawn grader script: {e}"))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&payload)
                .await
                .map_err(|e| format!("failed writing to script stdin: {e}"))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| format!("script grader process error: {e}"))?;

        if !output.status.success() {
            warn!(
                status = ?output.status,
                stderr = %String::from_utf8_lossy(&output.stderr),
                "grader script exited non-zero (informational only)"
            );
        }

        let parsed: ScriptOutput = serde_json::from_slice(&output.stdout).map_err(|e| {
            format!(
                "malformed grader script output ({e}): {}",
                String::from_utf8_lossy(&output.stdout)
            )
        })?;

        if !(0.0..=1.0).contains(&parsed.score) {
            return Err(format!("script returned out-of-range score {}", parsed.score));
        }

        Ok(GraderResult {
            score: parsed.score,
            passed: parsed.passed,
            feedback: parsed.feedback,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineResponse;
    use crate::spec::model::{ExpectedBehavior, TaskDefinition};
    use std::collections::HashSet;
    use std::path::PathBuf;

    fn task() -> TaskDefinition {
        TaskDefinition {
            id: "t1".into(),
            name: "T1".into(),
            description: None,
            tags: HashSet::new(),
            prompt: "p".into(),
            files: vec![],
            expected: ExpectedBehavior::default(),
            graders: vec![],
            source_path: PathBuf::new(),
        }
    }

    #[test]
    fn from_decl_captures_config_for_forwarding() {
        let decl = GraderDecl {
            name: "g".into(),
            kind: crate::spec::model::GraderKind::Script,
            config: serde_json::json!({ "command": "true", "threshold": 0.8 }),
        };
        let grader = ScriptGrader::from_decl(&decl);
        assert_eq!(grader.config["threshold"], serde_json::json!(0.8));
    }

    #[tokio::test]
    async fn malformed_output_fails_gracefully() {
        // `echo not-json` is a reasonable stand-in for a broken grader script.
        let decl = GraderDecl {
            name: "g".into(),
            kind: crate::spec::model::GraderKind::Script,
            config: serde_json::json!({ "command": "echo", "args": ["not-json"] }),
        };
        let grader = ScriptGrader::from_decl(&decl);
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
        assert_eq!(result.score, 0.0);
    }
}
