//! Validation of one iteration's output through the evaluator.

use std::sync::Arc;

use serde_json::json;

use super::task::{Task, TaskResponse};
use crate::eval::{CaseData, EvalDataCase, EvalDataset, EvalResult, Evaluator, RecordedOutputTarget};
use crate::error::Result;
use crate::id::{generate_case_id, generate_run_id};

/// Wraps a response in a single-case dataset and scores it.
#[derive(Clone)]
pub struct IterationValidator {
    evaluator: Evaluator,
}

impl IterationValidator {
    pub fn new(evaluator: Evaluator) -> Self {
        Self { evaluator }
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    /// One-case dataset holding the response of `iteration`.
    pub fn dataset(task: &Task, response: &TaskResponse, iteration: u32) -> EvalDataset {
        let output = json!({
            "instruction": task.instruction,
            "answer": response.answer,
            "success": response.success,
            "error": response.error,
            "trajectory": response.trajectory,
            "cost": response.cost,
        });
        let case = EvalDataCase::new(
            generate_case_id(&task.id, iteration as usize),
            task.id.as_str(),
            CaseData::Task {
                task: output,
                expected: task.expected.clone(),
            },
        )
        .with_metadata("iteration", json!(iteration));
        EvalDataset::single(generate_run_id(), case)
    }

    pub async fn validate(&self, task: &Task, response: &TaskResponse, iteration: u32) -> Result<EvalResult> {
        let dataset = Self::dataset(task, response, iteration);
        self.evaluator
            .evaluate(&dataset, Arc::new(RecordedOutputTarget))
            .await
    }
}
