//! Per-scorer aggregation of case metrics.
//!
//! Numeric metrics aggregate to mean/min/max/std, boolean metrics to
//! true_count/true_rate, nested metrics recurse per key. Results from all
//! repeat passes are pooled into one summary.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::metric::{EvalCriteria, EvalStatus, MetricValue};
use super::result::EvalCaseResult;

/// Aggregate of one metric across cases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricSummary {
    Numeric {
        mean: f64,
        min: f64,
        max: f64,
        std: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<EvalStatus>,
    },
    Boolean {
        true_count: usize,
        true_rate: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<EvalStatus>,
    },
    Nested {
        metrics: BTreeMap<String, MetricSummary>,
    },
}

impl MetricSummary {
    /// Value the criteria are judged against: mean or true rate.
    pub fn aggregate(&self) -> Option<f64> {
        match self {
            MetricSummary::Numeric { mean, .. } => Some(*mean),
            MetricSummary::Boolean { true_rate, .. } => Some(*true_rate),
            MetricSummary::Nested { .. } => None,
        }
    }

    /// Judged status. A nested summary fails if any judged child failed.
    pub fn status(&self) -> Option<EvalStatus> {
        match self {
            MetricSummary::Numeric { status, .. } | MetricSummary::Boolean { status, .. } => *status,
            MetricSummary::Nested { metrics } => {
                let mut judged = metrics.values().filter_map(|m| m.status()).peekable();
                judged.peek()?;
                if judged.all(|s| s.is_passed()) {
                    Some(EvalStatus::Passed)
                } else {
                    Some(EvalStatus::Failed)
                }
            }
        }
    }

    fn set_status(&mut self, new_status: EvalStatus) {
        match self {
            MetricSummary::Numeric { status, .. } | MetricSummary::Boolean { status, .. } => {
                *status = Some(new_status);
            }
            MetricSummary::Nested { .. } => {}
        }
    }
}

/// Summary of every metric produced by one scorer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScorerSummary {
    pub scorer_name: String,
    pub case_count: usize,
    pub metrics: BTreeMap<String, MetricSummary>,
}

impl ScorerSummary {
    pub fn metric(&self, name: &str) -> Option<&MetricSummary> {
        self.metrics.get(name)
    }

    /// True unless some judged metric failed.
    pub fn passed(&self) -> bool {
        self.metrics.values().all(|m| m.status() != Some(EvalStatus::Failed))
    }
}

/// Aggregate a list of metric values. Returns `None` for an empty list.
///
/// The kind of the first value decides the aggregation; values of another
/// kind are ignored.
pub fn summarize_values(values: &[&MetricValue]) -> Option<MetricSummary> {
    let first = values.first()?;
    match first {
        MetricValue::Number(_) => {
            let numbers: Vec<f64> = values
                .iter()
                .filter_map(|v| match v {
                    MetricValue::Number(n) => Some(*n),
                    _ => None,
                })
                .collect();
            Some(numeric_summary(&numbers))
        }
        MetricValue::Bool(_) => {
            let bools: Vec<bool> = values.iter().filter_map(|v| v.as_bool()).collect();
            let true_count = bools.iter().filter(|b| **b).count();
            Some(MetricSummary::Boolean {
                true_count,
                true_rate: true_count as f64 / bools.len() as f64,
                status: None,
            })
        }
        MetricValue::Nested(_) => {
            let mut by_key: BTreeMap<String, Vec<&MetricValue>> = BTreeMap::new();
            for value in values {
                if let MetricValue::Nested(map) = value {
                    for (key, child) in map {
                        by_key.entry(key.clone()).or_default().push(child);
                    }
                }
            }
            let metrics = by_key
                .into_iter()
                .filter_map(|(key, children)| summarize_values(&children).map(|s| (key, s)))
                .collect();
            Some(MetricSummary::Nested { metrics })
        }
    }
}

fn numeric_summary(numbers: &[f64]) -> MetricSummary {
    let n = numbers.len() as f64;
    let mean = numbers.iter().sum::<f64>() / n;
    let min = numbers.iter().copied().fold(f64::INFINITY, f64::min);
    let max = numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    // Sample standard deviation; a single observation has no spread.
    let std = if numbers.len() > 1 {
        let var = numbers.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
        var.sqrt()
    } else {
        0.0
    };
    MetricSummary::Numeric {
        mean,
        min,
        max,
        std,
        status: None,
    }
}

/// Summarize everything `scorer_name` produced across `results`, judging
/// aggregates against any applicable criteria.
pub fn summarize_scorer(scorer_name: &str, results: &[EvalCaseResult], criteria: &[EvalCriteria]) -> ScorerSummary {
    let mut by_metric: BTreeMap<&str, Vec<&MetricValue>> = BTreeMap::new();
    let mut case_count = 0;

    for result in results {
        let Some(scorer_result) = result.scorer_results.get(scorer_name) else {
            continue;
        };
        case_count += 1;
        for (metric_name, metric) in &scorer_result.metrics {
            by_metric.entry(metric_name.as_str()).or_default().push(&metric.value);
        }
    }

    let mut metrics = BTreeMap::new();
    for (metric_name, values) in by_metric {
        let Some(mut summary) = summarize_values(&values) else {
            continue;
        };
        judge_summary(&mut summary, scorer_name, metric_name, criteria);
        metrics.insert(metric_name.to_string(), summary);
    }

    ScorerSummary {
        scorer_name: scorer_name.to_string(),
        case_count,
        metrics,
    }
}

/// Apply criteria to `summary`, and to each nested child under its dotted
/// path (`retrieval.precision`).
fn judge_summary(summary: &mut MetricSummary, scorer_name: &str, path: &str, criteria: &[EvalCriteria]) {
    if let MetricSummary::Nested { metrics } = summary {
        for (key, child) in metrics.iter_mut() {
            judge_summary(child, scorer_name, &format!("{}.{}", path, key), criteria);
        }
        return;
    }
    if let Some(c) = criteria.iter().find(|c| c.applies_to(scorer_name, path)) {
        let status = c.judge_summary(summary);
        summary.set_status(status);
    }
}
