//! Reflection inputs and results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::eval::EvalResult;

/// What a reflector looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReflectionType {
    /// Why an iteration failed.
    Failure,
    /// How to do better, whatever the outcome.
    Optimization,
    /// What made an iteration work.
    Success,
    /// Trends across attempts.
    Pattern,
}

impl ReflectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReflectionType::Failure => "failure",
            ReflectionType::Optimization => "optimization",
            ReflectionType::Success => "success",
            ReflectionType::Pattern => "pattern",
        }
    }

    /// Whether reflectors of this type run for an iteration with the given outcome.
    ///
    /// Every type runs after a success; only failure and optimization
    /// reflectors run after a failure.
    pub fn applies_to(&self, success: bool) -> bool {
        success || matches!(self, ReflectionType::Failure | ReflectionType::Optimization)
    }
}

impl std::fmt::Display for ReflectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Validation outcome carried into reflection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub run_id: String,
    pub passed: bool,
    /// Failed summary metrics, as `scorer.metric`.
    pub failed_metrics: Vec<String>,
}

impl From<&EvalResult> for ValidationOutcome {
    fn from(result: &EvalResult) -> Self {
        Self {
            run_id: result.run_id.clone(),
            passed: result.passed(),
            failed_metrics: result.failed_metrics(),
        }
    }
}

/// One iteration's outcome, as seen by reflectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflectionInput {
    pub success: bool,
    /// Task input the iteration ran with.
    pub input: String,
    pub output: Option<String>,
    pub error: Option<String>,
    pub iteration: u32,
    /// Answers from earlier iterations, oldest first.
    #[serde(default)]
    pub prior_attempts: Vec<String>,
    pub validation: Option<ValidationOutcome>,
}

impl ReflectionInput {
    pub fn new(iteration: u32, input: impl Into<String>, success: bool) -> Self {
        Self {
            success,
            input: input.into(),
            output: None,
            error: None,
            iteration,
            prior_attempts: Vec::new(),
            validation: None,
        }
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_prior_attempts(mut self, attempts: Vec<String>) -> Self {
        self.prior_attempts = attempts;
        self
    }

    pub fn with_validation(mut self, validation: ValidationOutcome) -> Self {
        self.validation = Some(validation);
        self
    }
}

/// Findings produced by one reflector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflectionResult {
    pub reflector: String,
    pub reflection_type: ReflectionType,
    pub summary: String,
    #[serde(default)]
    pub key_findings: Vec<String>,
    #[serde(default)]
    pub root_causes: Vec<String>,
    #[serde(default)]
    pub insights: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl ReflectionResult {
    pub fn new(
        reflector: impl Into<String>,
        reflection_type: ReflectionType,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            reflector: reflector.into(),
            reflection_type,
            summary: summary.into(),
            key_findings: Vec::new(),
            root_causes: Vec::new(),
            insights: Vec::new(),
            suggestions: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_finding(mut self, finding: impl Into<String>) -> Self {
        self.key_findings.push(finding.into());
        self
    }

    pub fn with_root_cause(mut self, cause: impl Into<String>) -> Self {
        self.root_causes.push(cause.into());
        self
    }

    pub fn with_insight(mut self, insight: impl Into<String>) -> Self {
        self.insights.push(insight.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_selection_on_failure() {
        assert!(ReflectionType::Failure.applies_to(false));
        assert!(ReflectionType::Optimization.applies_to(false));
        assert!(!ReflectionType::Success.applies_to(false));
        assert!(!ReflectionType::Pattern.applies_to(false));
    }

    #[test]
    fn test_type_selection_on_success() {
        assert!(ReflectionType::Failure.applies_to(true));
        assert!(ReflectionType::Optimization.applies_to(true));
        assert!(ReflectionType::Success.applies_to(true));
        assert!(ReflectionType::Pattern.applies_to(true));
    }

    #[test]
    fn test_input_builder() {
        let input = ReflectionInput::new(2, "solve it", false)
            .with_output("42")
            .with_error("wrong answer")
            .with_prior_attempts(vec!["41".to_string()]);
        assert_eq!(input.iteration, 2);
        assert_eq!(input.output.as_deref(), Some("42"));
        assert_eq!(input.error.as_deref(), Some("wrong answer"));
        assert_eq!(input.prior_attempts.len(), 1);
        assert!(input.validation.is_none());
    }

    #[test]
    fn test_result_builder() {
        let result = ReflectionResult::new("feedback", ReflectionType::Failure, "it failed")
            .with_finding("f")
            .with_root_cause("c")
            .with_insight("i")
            .with_suggestion("s");
        assert_eq!(result.key_findings, vec!["f"]);
        assert_eq!(result.root_causes, vec!["c"]);
        assert_eq!(result.insights, vec!["i"]);
        assert_eq!(result.suggestions, vec!["s"]);
        assert_eq!(serde_json::to_value(result.reflection_type).unwrap(), "failure");
    }
}
