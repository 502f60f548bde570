//! Scorer trait and per-case scorer output.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::dataset::EvalDataCase;
use super::metric::{EvalCriteria, MetricResult};
use super::result::EvalCaseResult;
use super::summary::{ScorerSummary, summarize_scorer};
use crate::error::Result;

/// Metrics one scorer produced for one case.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScorerResult {
    pub scorer_name: String,
    pub metrics: BTreeMap<String, MetricResult>,
}

impl ScorerResult {
    pub fn new(scorer_name: impl Into<String>) -> Self {
        Self {
            scorer_name: scorer_name.into(),
            metrics: BTreeMap::new(),
        }
    }

    /// Add a metric (builder pattern)
    pub fn with_metric(mut self, name: impl Into<String>, metric: MetricResult) -> Self {
        self.metrics.insert(name.into(), metric);
        self
    }

    pub fn metric(&self, name: &str) -> Option<&MetricResult> {
        self.metrics.get(name)
    }
}

/// A pluggable scorer computing named metrics from a case's output.
#[async_trait]
pub trait Scorer: Send + Sync {
    /// Stable name; keys this scorer's results and summary.
    fn name(&self) -> &str;

    /// Criteria bound to this scorer's metrics.
    fn criteria(&self) -> &[EvalCriteria] {
        &[]
    }

    /// Score one case's output.
    async fn score(&self, index: usize, case: &EvalDataCase, output: &Value) -> Result<ScorerResult>;

    /// Score, then judge every metric that has bound criteria.
    async fn scorer_and_judge(&self, index: usize, case: &EvalDataCase, output: &Value) -> Result<ScorerResult> {
        let mut result = self.score(index, case, output).await?;
        for (metric_name, metric) in result.metrics.iter_mut() {
            if let Some(c) = self.criteria().iter().find(|c| c.applies_to(self.name(), metric_name)) {
                metric.status = Some(c.judge(&metric.value));
            }
        }
        Ok(result)
    }

    /// Aggregate this scorer's metrics across all case results.
    fn summarize(&self, results: &[EvalCaseResult]) -> ScorerSummary {
        summarize_scorer(self.name(), results, self.criteria())
    }
}
