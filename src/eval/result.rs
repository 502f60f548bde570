//! Evaluation outputs and run records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::dataset::EvalDataCase;
use super::scorer::ScorerResult;
use super::summary::ScorerSummary;

/// One case's output together with every scorer's result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalCaseResult {
    /// Position of the source case in the expanded input.
    pub index: usize,
    pub case: EvalDataCase,
    pub output: Value,
    pub scorer_results: BTreeMap<String, ScorerResult>,
}

/// Full output of one evaluation pass, ordered by case index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalResult {
    pub dataset_id: String,
    pub run_id: String,
    pub summary: BTreeMap<String, ScorerSummary>,
    pub eval_case_results: Vec<EvalCaseResult>,
}

impl EvalResult {
    /// True unless a judged summary metric failed.
    pub fn passed(&self) -> bool {
        self.summary.values().all(|s| s.passed())
    }

    /// Names of summary metrics judged as failed, as `scorer.metric`.
    pub fn failed_metrics(&self) -> Vec<String> {
        let mut failed = Vec::new();
        for (scorer, summary) in &self.summary {
            for (metric, m) in &summary.metrics {
                if m.status().is_some_and(|s| !s.is_passed()) {
                    failed.push(format!("{}.{}", scorer, metric));
                }
            }
        }
        failed
    }
}

/// Lifecycle of a persisted evaluation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvalRunStatus {
    Running,
    Complete,
    Failed,
}

/// Bookkeeping record for one evaluation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalRunRecord {
    pub run_id: String,
    pub dataset_id: String,
    pub status: EvalRunStatus,
    pub case_count: usize,
    pub started_at: i64,
    pub finished_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
