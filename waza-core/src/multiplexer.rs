//! Model Multiplexer: runs a loaded spec once per model,
//! sequentially, reusing the same parsed spec and tasks, and optionally
//! attaches a cross-model recommendation to each outcome's metadata.

use crate::error::{WazaError, WazaResult};
use crate::outcome::EvaluationOutcome;
use std::collections::HashSet;

/// Selects the "best" outcome among a completed multi-model run. The
/// default ranks by aggregate score only; a caller may supply a
/// different hook (e.g. weighting cost or latency) without altering how
/// outcomes themselves are computed.
pub trait RecommendationHook: Send + Sync {
    fn recommend<'a>(&self, outcomes: &'a [EvaluationOutcome]) -> Option<&'a EvaluationOutcome>;
}

pub struct HighestAggregateScore;

impl RecommendationHook for HighestAggregateScore {
    fn recommend<'a>(&self, outcomes: &'a [EvaluationOutcome]) -> Option<&'a EvaluationOutcome> {
        outcomes
            .iter()
            .max_by(|a, b| {
                a.digest
                    .aggregate_score
                    .partial_cmp(&b.digest.aggregate_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    }
}

/// Validate a requested model-id list against the spec's declared
/// default before dispatching runs. A single override equal to the
/// spec's declared model is a no-op.
pub fn resolve_model_ids(declared_model: &str, requested: &[String]) -> WazaResult<Vec<String>> {
    if requested.is_empty() {
        return Ok(vec![declared_model.to_string()]);
    }
    if requested.len() == 1 && requested[0] == declared_model {
        return Ok(vec![declared_model.to_string()]);
    }

    let mut seen = HashSet::new();
    for id in requested {
        if !seen.insert(id.as_str()) {
            return Err(WazaError::DuplicateModel(id.clone()));
        }
    }
    Ok(requested.to_vec())
}

/// Attach the recommendation hook's pick to every outcome's metadata
/// without mutating any outcome's tests or digest.
pub fn attach_recommendation(outcomes: &mut [EvaluationOutcome], hook: &dyn RecommendationHook) {
    let recommended_model = {
        let snapshot: Vec<EvaluationOutcome> = outcomes.to_vec();
        hook.recommend(&snapshot).map(|o| o.setup.model.clone())
    };
    let Some(recommended_model) = recommended_model else {
        return;
    };
    for outcome in outcomes.iter_mut() {
        outcome.metadata.insert(
            "recommended_model".to_string(),
            serde_json::Value::String(recommended_model.clone()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_request_falls_back_to_declared_model() {
        let ids = resolve_model_ids("gpt-default", &[]).unwrap();
        assert_eq!(ids, vec!["gpt-default".to_string()]);
    }

    #[test]
    fn single_override_matching_declared_is_noop() {
        let ids = resolve_model_ids("gpt-default", &["gpt-default".to_string()]).unwrap();
        assert_eq!(ids, vec!["gpt-default".to_string()]);
    }

    #[test]
    fn duplicate_model_ids_rejected() {
        let err = resolve_model_ids(
            "gpt-default",
            &["model-a".to_string(), "model-a".to_string()],
        )
        .unwrap_err();
        assert!(matches!(err, WazaError::DuplicateModel(_)));
    }

    #[test]
    fn distinct_models_pass_through() {
        let ids = resolve_model_ids("gpt-default", &["model-a".to_string(), "model-b".to_string()]).unwrap();
        assert_eq!(ids, vec!["model-a".to_string(), "model-b".to_string()]);
    }
}
