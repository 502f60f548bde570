//! Structured feedback for failed iterations.
//!
//! The [`FeedbackReflector`] classifies what went wrong in an iteration and
//! the [`FeedbackFormatter`] renders reflection results into a block of text
//! the next iteration's task receives as context.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::reflector::Reflector;
use super::types::{ReflectionInput, ReflectionResult, ReflectionType};
use crate::error::Result;

/// Category of failure for better organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    /// The executor raised or reported failure
    Execution,
    /// A validation metric was judged failed
    Validation,
    /// The iteration ran out of time
    Timeout,
    /// The answer matched an earlier attempt
    Repetition,
    /// No answer was produced
    EmptyOutput,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCategory::Execution => "execution",
            FailureCategory::Validation => "validation",
            FailureCategory::Timeout => "timeout",
            FailureCategory::Repetition => "repetition",
            FailureCategory::EmptyOutput => "empty_output",
        }
    }

    /// Remedy offered for this category.
    pub fn suggestion(&self) -> &'static str {
        match self {
            FailureCategory::Execution => "Address the execution error before changing the approach",
            FailureCategory::Validation => "Revise the answer so the failed checks pass",
            FailureCategory::Timeout => "Reduce the work per attempt or break the task into smaller steps",
            FailureCategory::Repetition => "Try a different approach; the last answer repeated an earlier one",
            FailureCategory::EmptyOutput => "Produce a complete, non-empty answer",
        }
    }
}

impl std::fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single classified failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetail {
    pub category: FailureCategory,
    pub message: String,
    pub context: Option<String>,
}

impl FailureDetail {
    pub fn new(category: FailureCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// Classify the failures visible in a reflection input.
pub fn classify(input: &ReflectionInput) -> Vec<FailureDetail> {
    let mut failures = Vec::new();

    if let Some(error) = &input.error {
        let category = if error.to_lowercase().contains("timeout")
            || error.to_lowercase().contains("timed out")
        {
            FailureCategory::Timeout
        } else {
            FailureCategory::Execution
        };
        failures.push(FailureDetail::new(category, error.clone()));
    }

    if let Some(validation) = &input.validation {
        for metric in &validation.failed_metrics {
            failures.push(
                FailureDetail::new(FailureCategory::Validation, format!("{} did not pass", metric))
                    .with_context(format!("validation run {}", validation.run_id)),
            );
        }
    }

    match input.output.as_deref().map(str::trim) {
        None | Some("") if !input.success => {
            failures.push(FailureDetail::new(
                FailureCategory::EmptyOutput,
                "No answer was produced",
            ));
        }
        Some(output) if !output.is_empty() => {
            if let Some(pos) = input.prior_attempts.iter().position(|a| a.trim() == output) {
                failures.push(
                    FailureDetail::new(
                        FailureCategory::Repetition,
                        format!("Answer repeats attempt {}", pos + 1),
                    )
                    .with_context(truncate_lines(output, 3)),
                );
            }
        }
        _ => {}
    }

    failures
}

/// Failure-typed reflector turning errors and failed checks into suggestions.
#[derive(Debug, Clone)]
pub struct FeedbackReflector {
    priority: i32,
}

impl FeedbackReflector {
    pub const NAME: &'static str = "feedback";

    pub fn new() -> Self {
        Self { priority: 10 }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl Default for FeedbackReflector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Reflector for FeedbackReflector {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn reflection_type(&self) -> ReflectionType {
        ReflectionType::Failure
    }

    async fn reflect(&self, input: &ReflectionInput) -> Result<ReflectionResult> {
        if input.success {
            return Ok(ReflectionResult::new(
                Self::NAME,
                ReflectionType::Failure,
                format!("Iteration {} succeeded", input.iteration),
            ));
        }

        let failures = classify(input);
        let summary = if failures.is_empty() {
            format!("Iteration {} failed without a recognizable cause", input.iteration)
        } else {
            format!(
                "Iteration {} failed with {} issue(s)",
                input.iteration,
                failures.len()
            )
        };

        let mut result = ReflectionResult::new(Self::NAME, ReflectionType::Failure, summary);
        let mut seen = Vec::new();
        for failure in &failures {
            result = result.with_finding(format!("[{}] {}", failure.category, failure.message));
            if !seen.contains(&failure.category) {
                seen.push(failure.category);
                result = result
                    .with_root_cause(failure.category.as_str())
                    .with_suggestion(failure.category.suggestion());
            }
        }
        if input.prior_attempts.len() >= 2 {
            result = result.with_insight(format!(
                "{} earlier attempts have not succeeded",
                input.prior_attempts.len()
            ));
        }
        Ok(result)
    }
}

/// Renders reflection results for the next task's context.
pub struct FeedbackFormatter {
    /// Maximum number of suggestions to include.
    pub max_suggestions: usize,

    /// Maximum number of findings to show per reflector.
    pub max_findings_per_reflector: usize,
}

impl Default for FeedbackFormatter {
    fn default() -> Self {
        Self {
            max_suggestions: 5,
            max_findings_per_reflector: 10,
        }
    }
}

impl FeedbackFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_suggestions(mut self, max: usize) -> Self {
        self.max_suggestions = max;
        self
    }

    pub fn with_max_findings_per_reflector(mut self, max: usize) -> Self {
        self.max_findings_per_reflector = max;
        self
    }

    /// Suggestions across all results, deduplicated, in result order.
    pub fn suggestions(&self, results: &[ReflectionResult]) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for suggestion in results.iter().flat_map(|r| r.suggestions.iter()) {
            if out.len() == self.max_suggestions {
                break;
            }
            if !out.contains(suggestion) {
                out.push(suggestion.clone());
            }
        }
        out
    }

    /// Format one iteration's reflections. Empty when nothing was suggested or found.
    pub fn format(&self, iteration: u32, results: &[ReflectionResult]) -> String {
        let suggestions = self.suggestions(results);
        let has_findings = results.iter().any(|r| !r.key_findings.is_empty());
        if suggestions.is_empty() && !has_findings {
            return String::new();
        }

        let mut output = format!("## Feedback from iteration {}\n\n", iteration);

        let mut by_reflector: BTreeMap<&str, Vec<&String>> = BTreeMap::new();
        for result in results {
            by_reflector
                .entry(result.reflector.as_str())
                .or_default()
                .extend(result.key_findings.iter());
        }

        for (reflector, findings) in by_reflector.into_iter().filter(|(_, f)| !f.is_empty()) {
            output.push_str(&format!("**{}**:\n", reflector));
            for finding in findings.iter().take(self.max_findings_per_reflector) {
                output.push_str(&format!("- {}\n", finding));
            }
            if findings.len() > self.max_findings_per_reflector {
                output.push_str(&format!(
                    "- ... and {} more\n",
                    findings.len() - self.max_findings_per_reflector
                ));
            }
            output.push('\n');
        }

        if !suggestions.is_empty() {
            output.push_str("**Suggestions:**\n");
            for suggestion in &suggestions {
                output.push_str(&format!("- {}\n", suggestion));
            }
        }

        output.trim_end().to_string()
    }
}

/// Truncate text to a maximum number of lines.
fn truncate_lines(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text.lines().take(max_lines).collect();
    let truncated = lines.len() < text.lines().count();
    let mut result = lines.join("\n");
    if truncated {
        result.push_str("\n... (truncated)");
    }
    result
}
