//! Eval target seam: the capability that produces an output for a case.

use async_trait::async_trait;
use serde_json::Value;

use super::dataset::{CaseData, EvalDataCase};
use crate::error::{EvalLoopError, Result};

/// Produces an output for one case.
#[async_trait]
pub trait EvalTarget: Send + Sync {
    async fn predict(&self, case: &EvalDataCase) -> Result<Value>;
}

/// Target that replays outputs already stored on the case.
///
/// `Recorded` cases yield their `output`, `Task` cases yield the wrapped
/// task value. Other cases cannot be replayed.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordedOutputTarget;

#[async_trait]
impl EvalTarget for RecordedOutputTarget {
    async fn predict(&self, case: &EvalDataCase) -> Result<Value> {
        match case.data() {
            CaseData::Recorded { output, .. } => Ok(output.clone()),
            CaseData::Task { task, .. } => Ok(task.clone()),
            CaseData::Query { .. } | CaseData::Raw { .. } => Err(EvalLoopError::Predict {
                index: 0,
                message: format!("case {} has no recorded output", case.case_id()),
            }),
        }
    }
}
