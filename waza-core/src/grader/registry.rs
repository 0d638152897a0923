//! Composes a task's effective grader list and runs them sequentially
//! per trial, in declared order.

use super::{build_grader, GraderContext, GraderResult};
use crate::engine::EngineResponse;
use crate::progress::{ProgressBus, ProgressEvent, ProgressEventKind, TrialStatus};
use crate::spec::model::{GraderDecl, TaskDefinition};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;

/// Stateless: holds no mutable data, just the composition logic. Kept as
/// a named type so the scheduler has a single thing to depend on.
pub struct GraderRegistry;

impl GraderRegistry {
    /// Run every grader in `task`'s effective list (spec graders followed
    /// by task overrides) against `response`, in order. A grader that
    /// panics is caught and converted into a `GraderFailure`-shaped
    /// result; it never aborts the remaining graders in the trial. Emits
    /// a `GraderResult` progress event after each grader runs.
    #[allow(clippy::too_many_arguments)]
    pub async fn evaluate(
        spec_graders: &[GraderDecl],
        task: &TaskDefinition,
        response: &EngineResponse,
        progress: &ProgressBus,
        test_index: usize,
        test_total: usize,
        run_number: u32,
    ) -> Vec<(String, GraderResult)> {
        let decls = task.effective_graders(spec_graders);
        let mut results = Vec::with_capacity(decls.len());

        for decl in decls {
            let grader = build_grader(decl);
            let ctx = GraderContext { task, response };

            let outcome = match AssertUnwindSafe(grader.grade(&ctx)).catch_unwind().await {
                Ok(result) => result,
                Err(_) => GraderResult::failed(format!("grader '{}' panicked", decl.name)),
            };

            progress
                .emit(
                    ProgressEvent::new(ProgressEventKind::GraderResult, test_index, test_total, &task.name)
                        .with_run(run_number)
                        .with_status(if outcome.passed { TrialStatus::Passed } else { TrialStatus::Failed })
                        .with_truncated_detail("grader", &decl.name)
                        .with_truncated_detail("feedback", &outcome.feedback),
                )
                .await;

            results.push((decl.name.clone(), outcome));
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::model::{ExpectedBehavior, GraderKind};
    use std::collections::HashSet;
    use std::path::PathBuf;

    fn task(graders: Vec<GraderDecl>) -> TaskDefinition {
        TaskDefinition {
            id: "t1".into(),
            name: "T1".into(),
            description: None,
            tags: HashSet::new(),
            prompt: "Explain this code".into(),
            files: vec![],
            expected: ExpectedBehavior::default(),
            graders,
            source_path: PathBuf::new(),
        }
    }

    #[tokio::test]
    async fn runs_spec_and_task_graders_in_declared_order() {
        let spec_graders = vec![GraderDecl {
            name: "spec_len".into(),
            kind: GraderKind::Code,
            config: serde_json::json!({ "assertion": "len(output) > 0" }),
        }];
        let task_override = vec![GraderDecl {
            name: "task_len".into(),
            kind: GraderKind::Code,
            config: serde_json::json!({ "assertion": "len(output) > 0" }),
        }];
        let task = task(task_override);
        let response = EngineResponse {
            output: "hello".into(),
            tool_call_count: 0,
            success: true,
            error: None,
        };

        let progress = ProgressBus::new();
        let results = GraderRegistry::evaluate(&spec_graders, &task, &response, &progress, 0, 1, 1).await;
        let names: Vec<&str> = results.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["spec_len", "task_len"]);
        assert!(results.iter().all(|(_, r)| r.passed));
    }
}
