//! Built-in scorers.

use async_trait::async_trait;
use serde_json::{Value, json};

use super::dataset::EvalDataCase;
use super::metric::{EvalCriteria, MetricResult};
use super::scorer::{Scorer, ScorerResult};
use crate::error::{EvalLoopError, Result};

/// Compares the output's `answer` against the case's expected answer.
///
/// Produces the boolean metric `exact_match`. Cases without an expected
/// answer are a scorer error.
pub struct ExactMatchScorer {
    case_sensitive: bool,
    criteria: Vec<EvalCriteria>,
}

impl ExactMatchScorer {
    pub const NAME: &'static str = "exact_match";

    pub fn new() -> Self {
        Self {
            case_sensitive: true,
            criteria: Vec::new(),
        }
    }

    pub fn case_insensitive(mut self) -> Self {
        self.case_sensitive = false;
        self
    }

    pub fn with_criteria(mut self, criteria: EvalCriteria) -> Self {
        self.criteria.push(criteria);
        self
    }

    fn normalize(&self, s: &str) -> String {
        let trimmed = s.trim();
        if self.case_sensitive {
            trimmed.to_string()
        } else {
            trimmed.to_lowercase()
        }
    }
}

impl Default for ExactMatchScorer {
    fn default() -> Self {
        Self::new()
    }
}

/// Pull a textual answer out of an output value.
pub fn answer_text(output: &Value) -> Option<&str> {
    match output {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => map.get("answer").and_then(|v| v.as_str()),
        _ => None,
    }
}

#[async_trait]
impl Scorer for ExactMatchScorer {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn criteria(&self) -> &[EvalCriteria] {
        &self.criteria
    }

    async fn score(&self, index: usize, case: &EvalDataCase, output: &Value) -> Result<ScorerResult> {
        let expected = case.data().expected().ok_or_else(|| EvalLoopError::Scorer {
            scorer: Self::NAME.to_string(),
            index,
            message: format!("case {} has no expected answer", case.case_id()),
        })?;
        let actual = answer_text(output).unwrap_or_default();
        let matched = self.normalize(actual) == self.normalize(expected);

        let metric = MetricResult::new(matched)
            .with_metadata("expected", json!(expected))
            .with_metadata("actual", json!(actual));
        Ok(ScorerResult::new(Self::NAME).with_metric("exact_match", metric))
    }
}

/// Reads the `success` flag of a task response.
///
/// Produces the boolean metric `success`, judged against a default
/// criteria so that an unsuccessful task fails validation.
pub struct TaskSuccessScorer {
    criteria: Vec<EvalCriteria>,
}

impl TaskSuccessScorer {
    pub const NAME: &'static str = "task_success";

    pub fn new() -> Self {
        Self {
            criteria: vec![EvalCriteria::new("success").with_threshold(1.0).for_scorer(Self::NAME)],
        }
    }
}

impl Default for TaskSuccessScorer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Scorer for TaskSuccessScorer {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn criteria(&self) -> &[EvalCriteria] {
        &self.criteria
    }

    async fn score(&self, _index: usize, _case: &EvalDataCase, output: &Value) -> Result<ScorerResult> {
        let success = output.get("success").and_then(|v| v.as_bool()).unwrap_or(false);
        let mut metric = MetricResult::new(success);
        if let Some(error) = output.get("error").and_then(|v| v.as_str()) {
            metric = metric.with_metadata("error", json!(error));
        }
        Ok(ScorerResult::new(Self::NAME).with_metric("success", metric))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::dataset::CaseData;
    use crate::eval::metric::{EvalStatus, MetricValue};

    fn query_case(expected: Option<&str>) -> EvalDataCase {
        EvalDataCase::new(
            "c0",
            "qa",
            CaseData::Query {
                query: "q".to_string(),
                expected: expected.map(String::from),
            },
        )
    }

    #[tokio::test]
    async fn test_exact_match_hit() {
        let scorer = ExactMatchScorer::new();
        let result = scorer
            .score(0, &query_case(Some("Paris")), &json!({"answer": " Paris "}))
            .await
            .unwrap();
        assert_eq!(result.metric("exact_match").unwrap().value, MetricValue::Bool(true));
    }

    #[tokio::test]
    async fn test_exact_match_case_sensitivity() {
        let strict = ExactMatchScorer::new();
        let loose = ExactMatchScorer::new().case_insensitive();
        let case = query_case(Some("Paris"));
        let output = json!("paris");

        let r = strict.score(0, &case, &output).await.unwrap();
        assert_eq!(r.metric("exact_match").unwrap().value, MetricValue::Bool(false));

        let r = loose.score(0, &case, &output).await.unwrap();
        assert_eq!(r.metric("exact_match").unwrap().value, MetricValue::Bool(true));
    }

    #[tokio::test]
    async fn test_exact_match_requires_expected() {
        let scorer = ExactMatchScorer::new();
        let err = scorer.score(3, &query_case(None), &json!("x")).await.unwrap_err();
        assert!(matches!(err, EvalLoopError::Scorer { index: 3, .. }));
    }

    #[tokio::test]
    async fn test_task_success_judged() {
        let scorer = TaskSuccessScorer::new();
        let case = EvalDataCase::new("c0", "v", CaseData::Task {
                task: json!({}),
                expected: None,
            });

        let ok = scorer
            .scorer_and_judge(0, &case, &json!({"success": true}))
            .await
            .unwrap();
        assert_eq!(ok.metric("success").unwrap().status, Some(EvalStatus::Passed));

        let failed = scorer
            .scorer_and_judge(0, &case, &json!({"success": false, "error": "boom"}))
            .await
            .unwrap();
        let metric = failed.metric("success").unwrap();
        assert_eq!(metric.status, Some(EvalStatus::Failed));
        assert_eq!(metric.metadata["error"], json!("boom"));
    }

    #[test]
    fn test_answer_text() {
        assert_eq!(answer_text(&json!("a")), Some("a"));
        assert_eq!(answer_text(&json!({"answer": "b"})), Some("b"));
        assert_eq!(answer_text(&json!(42)), None);
    }
}
