//! Statistics Engine: per-task TestStats and the cross-task
//! OutcomeDigest, including a 95% confidence interval on each task's
//! mean score via the Student-t distribution.

use crate::outcome::{RunResult, TestOutcome, TestStatus};
use serde::{Deserialize, Serialize};

/// Per-task statistics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TestStats {
    #[serde(serialize_with = "crate::decimal::six_digit")]
    pub pass_rate: f64,
    #[serde(serialize_with = "crate::decimal::six_digit")]
    pub avg_score: f64,
    #[serde(serialize_with = "crate::decimal::six_digit")]
    pub min_score: f64,
    #[serde(serialize_with = "crate::decimal::six_digit")]
    pub max_score: f64,
    #[serde(serialize_with = "crate::decimal::six_digit")]
    pub stddev_score: f64,
    pub avg_duration_ms: f64,
    pub flaky: bool,
    #[serde(serialize_with = "crate::decimal::six_digit")]
    pub ci95_low: f64,
    #[serde(serialize_with = "crate::decimal::six_digit")]
    pub ci95_high: f64,
}

/// Aggregation over all TestOutcomes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OutcomeDigest {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errored: usize,
    /// Tasks the scheduler never ran because the benchmark was cancelled
    /// before reaching them. `succeeded + failed + errored + na == total`.
    pub na: usize,
    #[serde(serialize_with = "crate::decimal::six_digit")]
    pub success_rate: f64,
    #[serde(serialize_with = "crate::decimal::six_digit")]
    pub aggregate_score: f64,
    #[serde(serialize_with = "crate::decimal::six_digit")]
    pub min_task_score: f64,
    #[serde(serialize_with = "crate::decimal::six_digit")]
    pub max_task_score: f64,
    #[serde(serialize_with = "crate::decimal::six_digit")]
    pub stddev_task_score: f64,
    pub total_duration_ms: u64,
}

pub struct StatisticsEngine;

impl StatisticsEngine {
    pub fn compute_test_stats(runs: &[RunResult]) -> TestStats {
        if runs.is_empty() {
            return TestStats {
                pass_rate: 0.0,
                avg_score: 0.0,
                min_score: 0.0,
                max_score: 0.0,
                stddev_score: 0.0,
                avg_duration_ms: 0.0,
                flaky: false,
                ci95_low: 0.0,
                ci95_high: 0.0,
            };
        }

        let n = runs.len();
        // Fixed iteration order (runs are already sorted by run_number by
        // the caller) so summation order is deterministic.
        let scores: Vec<f64> = runs.iter().map(|r| r.run_score()).collect();
        let passed = runs
            .iter()
            .filter(|r| r.status == crate::outcome::RunStatus::Passed)
            .count();
        let pass_rate = passed as f64 / n as f64;

        let sum: f64 = scores.iter().sum();
        let avg_score = sum / n as f64;
        let min_score = scores.iter().cloned().fold(f64::INFINITY, f64::min);
        let max_score = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

        let variance = if n > 1 {
            scores.iter().map(|s| (s - avg_score).powi(2)).sum::<f64>() / (n - 1) as f64
        } else {
            0.0
        };
        let stddev_score = variance.sqrt();

        let duration_sum: u64 = runs.iter().map(|r| r.duration_ms).sum();
        let avg_duration_ms = duration_sum as f64 / n as f64;

        let flaky = pass_rate > 0.0 && pass_rate < 1.0;

        let (ci95_low, ci95_high) = if n == 1 {
            (scores[0], scores[0])
        } else {
            let se = stddev_score / (n as f64).sqrt();
            let df = (n - 1) as f64;
            let t_crit = t_critical(0.975, df);
            let margin = t_crit * se;
            (avg_score - margin, avg_score + margin)
        };

        TestStats {
            pass_rate,
            avg_score,
            min_score,
            max_score,
            stddev_score,
            avg_duration_ms,
            flaky,
            ci95_low,
            ci95_high,
        }
    }

    pub fn compute_digest(tests: &[TestOutcome]) -> OutcomeDigest {
        let total = tests.len();
        let succeeded = tests.iter().filter(|t| t.status == TestStatus::Passed).count();
        let failed = tests.iter().filter(|t| t.status == TestStatus::Failed).count();
        let errored = tests.iter().filter(|t| t.status == TestStatus::Error).count();
        let na = tests.iter().filter(|t| t.status == TestStatus::Na).count();
        let success_rate = if total > 0 {
            succeeded as f64 / total as f64
        } else {
            0.0
        };

        // Na tasks never ran, so their stats are a placeholder zero and
        // would only dilute the aggregate, not reflect it.
        let task_means: Vec<f64> = tests
            .iter()
            .filter(|t| t.status != TestStatus::Na)
            .map(|t| t.stats.avg_score)
            .collect();
        let aggregate_score = if task_means.is_empty() {
            0.0
        } else {
            task_means.iter().sum::<f64>() / task_means.len() as f64
        };
        let min_task_score = task_means.iter().cloned().fold(f64::INFINITY, f64::min);
        let max_task_score = task_means.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let stddev_task_score = if task_means.len() > 1 {
            let variance = task_means
                .iter()
                .map(|m| (m - aggregate_score).powi(2))
                .sum::<f64>()
                / (task_means.len() - 1) as f64;
            variance.sqrt()
        } else {
            0.0
        };

        let total_duration_ms: u64 = tests
            .iter()
            .flat_map(|t| t.runs.iter())
            .map(|r| r.duration_ms)
            .sum();

        OutcomeDigest {
            total,
            succeeded,
            failed,
            errored,
            na,
            success_rate,
            aggregate_score: if task_means.is_empty() { 0.0 } else { aggregate_score },
            min_task_score: if task_means.is_empty() { 0.0 } else { min_task_score },
            max_task_score: if task_means.is_empty() { 0.0 } else { max_task_score },
            stddev_task_score,
            total_duration_ms,
        }
    }
}

/// Critical t-value for probability `p` and degrees of freedom `df`.
fn t_critical(p: f64, df: f64) -> f64 {
    if df > 30.0 {
        return normal_inv(p);
    }
    let z = normal_inv(p);
    let g1 = (z.powi(3) + z) / 4.0;
    let g2 = (5.0 * z.powi(5) + 16.0 * z.powi(3) + 3.0 * z) / 96.0;
    z + g1 / df + g2 / (df * df)
}

/// Inverse normal CDF (probit), Acklam's rational approximation.
fn normal_inv(p: f64) -> f64 {
    let a = [
        -3.969683028665376e+01,
        2.209460984245205e+02,
        -2.759285104469687e+02,
        1.383577518672690e+02,
        -3.066479806614716e+01,
        2.506628277459239e+00,
    ];
    let b = [
        -5.447609879822406e+01,
        1.615858368580409e+02,
        -1.556989798598866e+02,
        6.680131188771972e+01,
        -1.328068155288572e+01,
    ];
    let c = [
        -7.784894002430293e-03,
        -3.223964580411365e-01,
        -2.400758277161838e+00,
        -2.549732539343734e+00,
        4.374664141464968e+00,
        2.938163982698783e+00,
    ];
    let d = [
        7.784695709041462e-03,
        3.224671290700398e-01,
        2.445134137142996e+00,
        3.754408661907416e+00,
    ];

    let p_low = 0.02425;
    let p_high = 1.0 - p_low;

    if p < p_low {
        let q = (-2.0 * p.ln()).sqrt();
        (((((c[0] * q + c[1]) * q + c[2]) * q + c[3]) * q + c[4]) * q + c[5])
            / ((((d[0] * q + d[1]) * q + d[2]) * q + d[3]) * q + 1.0)
    } else if p <= p_high {
        let q = p - 0.5;
        let r = q * q;
        (((((a[0] * r + a[1]) * r + a[2]) * r + a[3]) * r + a[4]) * r + a[5]) * q
            / (((((b[0] * r + b[1]) * r + b[2]) * r + b[3]) * r + b[4]) * r + 1.0)
    } else {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -(((((c[0] * q + c[1]) * q + c[2]) * q + c[3]) * q + c[4]) * q + c[5])
            / ((((d[0] * q + d[1]) * q + d[2]) * q + d[3]) * q + 1.0)
    }
}
