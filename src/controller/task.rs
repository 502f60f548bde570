//! Task, task response and the executor seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::id::generate_task_id;

/// A unit of work handed to the executor each iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub instruction: String,
    /// Reference answer used by validators that compare answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    /// Feedback accumulated from earlier iterations, oldest first.
    #[serde(default)]
    pub context: Vec<String>,
}

impl Task {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            id: generate_task_id(),
            instruction: instruction.into(),
            expected: None,
            context: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_expected(mut self, expected: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context.push(context.into());
        self
    }

    /// The instruction followed by accumulated feedback.
    pub fn render(&self) -> String {
        if self.context.is_empty() {
            self.instruction.clone()
        } else {
            format!(
                "{}\n\n## Previous Iteration Feedback\n\n{}",
                self.instruction,
                self.context.join("\n\n")
            )
        }
    }
}

/// What the executor produced for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResponse {
    pub answer: String,
    #[serde(default)]
    pub trajectory: Vec<Value>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub cost: f64,
}

impl TaskResponse {
    pub fn success(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            trajectory: Vec::new(),
            success: true,
            error: None,
            cost: 0.0,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            answer: String::new(),
            trajectory: Vec::new(),
            success: false,
            error: Some(error.into()),
            cost: 0.0,
        }
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_trajectory(mut self, trajectory: Vec<Value>) -> Self {
        self.trajectory = trajectory;
        self
    }

    pub fn with_answer(mut self, answer: impl Into<String>) -> Self {
        self.answer = answer.into();
        self
    }
}

/// Executes one task. Implementations may be long-running.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: &Task) -> Result<TaskResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_new() {
        let task = Task::new("add numbers");
        assert!(task.id.starts_with("task-"));
        assert_eq!(task.render(), "add numbers");
    }

    #[test]
    fn test_render_with_context() {
        let task = Task::new("add numbers")
            .with_id("t1")
            .with_context("first note")
            .with_context("second note");
        assert_eq!(
            task.render(),
            "add numbers\n\n## Previous Iteration Feedback\n\nfirst note\n\nsecond note"
        );
    }

    #[test]
    fn test_response_constructors() {
        let ok = TaskResponse::success("4").with_cost(0.1);
        assert!(ok.success);
        assert_eq!(ok.cost, 0.1);
        assert!(ok.error.is_none());

        let failed = TaskResponse::failure("boom");
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("boom"));
        assert!(failed.answer.is_empty());
    }

    #[test]
    fn test_response_builders() {
        let response = TaskResponse::failure("timed out")
            .with_answer("partial")
            .with_trajectory(vec![json!({"step": 1}), json!({"step": 2})]);
        assert_eq!(response.answer, "partial");
        assert_eq!(response.trajectory.len(), 2);
        assert!(!response.success);
    }

    #[test]
    fn test_response_serde_defaults() {
        let response: TaskResponse = serde_json::from_value(json!({
            "answer": "x",
            "success": true
        }))
        .unwrap();
        assert_eq!(response.cost, 0.0);
        assert!(response.trajectory.is_empty());
    }
}
