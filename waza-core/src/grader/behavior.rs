//! `behavior` grader (non-deterministic): inspects the shape of the
//! engine's response the way a judge watching the live session would —
//! coherence, relevance to the prompt, and quality signals. Classified
//! non-deterministic regardless of this particular implementation's
//! internals, because a production behavior grader observes a live,
//! non-replayable session.

use super::{Grader, GraderContext, GraderResult};
use crate::spec::model::GraderDecl;
use async_trait::async_trait;
use std::collections::HashSet;

pub struct BehaviorGrader {
    name: String,
    pass_threshold: f64,
}

impl BehaviorGrader {
    pub fn from_decl(decl: &GraderDecl) -> Self {
        let pass_threshold = decl
            .config
            .get("pass_threshold")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.6);
        Self {
            name: decl.name.clone(),
            pass_threshold,
        }
    }
}

#[async_trait]
impl Grader for BehaviorGrader {
    fn name(&self) -> &str {
        &self.name
    }

    async fn grade(&self, ctx: &GraderContext<'_>) -> GraderResult {
        let score = score_behavior(&ctx.task.prompt, &ctx.response.output);
        let passed = score >= self.pass_threshold;
        GraderResult {
            score,
            passed,
            feedback: format!(
                "behavior score {:.2} ({} threshold {:.2})",
                score,
                if passed { "meets" } else { "below" },
                self.pass_threshold
            ),
        }
    }
}

/// Coherence/relevance heuristic, in the spirit of a fast pre-LLM scoring
/// pass: rewards structured, on-topic responses and penalizes hedging.
fn score_behavior(input: &str, output: &str) -> f64 {
    if output.trim().is_empty() {
        return 0.0;
    }

    let sentence_count = output
        .split(['.', '!', '?'])
        .filter(|s| !s.trim().is_empty())
        .count();
    let coherence: f64 = match sentence_count {
        0 => 0.2,
        1 => 0.5,
        _ => 0.8,
    };

    let input_words: HashSet<&str> = input
        .split_whitespace()
        .filter(|w| w.len() > 3)
        .collect();
    let output_words: HashSet<&str> = output
        .split_whitespace()
        .filter(|w| w.len() > 3)
        .collect();
    let relevance = if input_words.is_empty() || output_words.is_empty() {
        0.5
    } else {
        let overlap = input_words.intersection(&output_words).count();
        let max_possible = input_words.len().min(output_words.len()).max(1);
        (0.4 + (overlap as f64 / max_possible as f64) * 0.5).min(1.0)
    };

    let hedging_penalty = ["i don't know", "not sure", "unable to"]
        .iter()
        .filter(|phrase| output.to_lowercase().contains(**phrase))
        .count() as f64
        * 0.15;

    ((coherence + relevance) / 2.0 - hedging_penalty).clamp(0.0, 1.0)
}
