//! Metric values, results and pass/fail criteria.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::summary::MetricSummary;

/// Judged status of a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EvalStatus {
    Passed,
    Failed,
}

impl EvalStatus {
    pub fn is_passed(&self) -> bool {
        matches!(self, EvalStatus::Passed)
    }
}

impl std::fmt::Display for EvalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvalStatus::Passed => write!(f, "PASSED"),
            EvalStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// Raw value of a metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Bool(bool),
    Number(f64),
    Nested(BTreeMap<String, MetricValue>),
}

impl MetricValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Number(n) => Some(*n),
            MetricValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            MetricValue::Nested(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetricValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl std::fmt::Display for MetricValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricValue::Bool(b) => write!(f, "{}", b),
            MetricValue::Number(n) => write!(f, "{:.4}", n),
            MetricValue::Nested(map) => {
                let parts: Vec<String> = map.iter().map(|(k, v)| format!("{}:{}", k, v)).collect();
                write!(f, "{{{}}}", parts.join(","))
            }
        }
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        MetricValue::Number(v)
    }
}

impl From<bool> for MetricValue {
    fn from(v: bool) -> Self {
        MetricValue::Bool(v)
    }
}

/// One metric produced by a scorer for one case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricResult {
    pub value: MetricValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<EvalStatus>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl MetricResult {
    pub fn new(value: impl Into<MetricValue>) -> Self {
        Self {
            value: value.into(),
            status: None,
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_status(mut self, status: EvalStatus) -> Self {
        self.status = Some(status);
        self
    }
}

/// Pass/fail criteria bound to a metric.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EvalCriteria {
    pub metric_name: String,
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    /// Restrict the criteria to one scorer; `None` applies to any scorer.
    #[serde(default)]
    pub scorer: Option<String>,
}

impl EvalCriteria {
    pub fn new(metric_name: impl Into<String>) -> Self {
        Self {
            metric_name: metric_name.into(),
            ..Default::default()
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn with_bounds(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn for_scorer(mut self, scorer: impl Into<String>) -> Self {
        self.scorer = Some(scorer.into());
        self
    }

    /// Whether this criteria applies to `metric` produced by `scorer`.
    pub fn applies_to(&self, scorer: &str, metric: &str) -> bool {
        self.metric_name == metric && self.scorer.as_deref().is_none_or(|s| s == scorer)
    }

    /// Whether a threshold, min or max is set.
    pub fn has_bounds(&self) -> bool {
        self.threshold.is_some() || self.min.is_some() || self.max.is_some()
    }

    /// Judge a raw metric value.
    ///
    /// An unbounded boolean passes only when true.
    pub fn judge(&self, value: &MetricValue) -> EvalStatus {
        match value {
            MetricValue::Bool(b) if self.has_bounds() => self.judge_number(if *b { 1.0 } else { 0.0 }),
            MetricValue::Bool(b) => passed_if(*b),
            MetricValue::Number(n) => self.judge_number(*n),
            MetricValue::Nested(_) => EvalStatus::Failed,
        }
    }

    /// Judge an aggregate the same way [`judge`](Self::judge) treats one value.
    ///
    /// An unbounded boolean summary passes only when every case was true.
    pub fn judge_summary(&self, summary: &MetricSummary) -> EvalStatus {
        match summary {
            MetricSummary::Boolean { true_rate, .. } if !self.has_bounds() => passed_if(*true_rate >= 1.0),
            MetricSummary::Boolean { true_rate, .. } => self.judge_number(*true_rate),
            MetricSummary::Numeric { mean, .. } => self.judge_number(*mean),
            MetricSummary::Nested { .. } => EvalStatus::Failed,
        }
    }

    /// Judge an aggregate (mean or true rate).
    pub fn judge_number(&self, value: f64) -> EvalStatus {
        if value.is_nan() {
            return EvalStatus::Failed;
        }
        let above_threshold = self.threshold.is_none_or(|t| value >= t);
        let above_min = self.min.is_none_or(|m| value >= m);
        let below_max = self.max.is_none_or(|m| value <= m);
        if above_threshold && above_min && below_max {
            EvalStatus::Passed
        } else {
            EvalStatus::Failed
        }
    }
}

fn passed_if(ok: bool) -> EvalStatus {
    if ok { EvalStatus::Passed } else { EvalStatus::Failed }
}
