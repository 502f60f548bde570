//! Bounded-concurrency evaluator.
//!
//! Runs predict + score for every case under a fixed concurrency ceiling.
//! The pool is seeded with `concurrency_limit` units; each time a unit
//! finishes a replacement is started from the pending queue, until the
//! queue is empty and the pool drains. Results arrive in completion order
//! and are sorted back into case-index order before the result is built.
//!
//! A batch is all-or-nothing: the first failing unit aborts every other
//! in-flight unit, the pool is drained, and the error is returned.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use tokio::task::JoinSet;

use super::dataset::{EvalDataCase, EvalDataset};
use super::result::{EvalCaseResult, EvalResult, EvalRunRecord, EvalRunStatus};
use super::scorer::Scorer;
use super::target::EvalTarget;
use crate::config::LoopConfig;
use crate::error::{EvalLoopError, Result};
use crate::id::now_ms;
use crate::storage::{DATASETS, RESULTS, RUNS, Storage, StorageExt};

/// Evaluator settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluatorConfig {
    /// Maximum in-flight predict+score units.
    pub concurrency_limit: usize,
    /// Consecutive full passes over the dataset.
    pub repeat_times: usize,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: crate::config::DEFAULT_CONCURRENCY_LIMIT,
            repeat_times: 1,
        }
    }
}

impl From<&LoopConfig> for EvaluatorConfig {
    fn from(config: &LoopConfig) -> Self {
        Self {
            concurrency_limit: config.concurrency_limit,
            repeat_times: config.repeat_times,
        }
    }
}

/// Scores a dataset against a set of scorers.
#[derive(Clone)]
pub struct Evaluator {
    config: EvaluatorConfig,
    scorers: Vec<Arc<dyn Scorer>>,
}

impl Evaluator {
    pub fn new(config: EvaluatorConfig) -> Self {
        Self {
            config,
            scorers: Vec::new(),
        }
    }

    /// Add a scorer (builder pattern)
    pub fn with_scorer(mut self, scorer: impl Scorer + 'static) -> Self {
        self.scorers.push(Arc::new(scorer));
        self
    }

    /// Add a shared scorer
    pub fn with_shared_scorer(mut self, scorer: Arc<dyn Scorer>) -> Self {
        self.scorers.push(scorer);
        self
    }

    pub fn config(&self) -> EvaluatorConfig {
        self.config
    }

    pub fn scorer_names(&self) -> Vec<&str> {
        self.scorers.iter().map(|s| s.name()).collect()
    }

    /// Evaluate every case of `dataset` with `target`.
    pub async fn evaluate(&self, dataset: &EvalDataset, target: Arc<dyn EvalTarget>) -> Result<EvalResult> {
        if self.config.concurrency_limit == 0 {
            return Err(EvalLoopError::InvalidConfig("concurrency_limit must be > 0".to_string()));
        }

        // Expand into repeat passes; the index is the position in the expanded input.
        let mut pending: VecDeque<(usize, EvalDataCase)> = (0..self.config.repeat_times)
            .flat_map(|_| dataset.cases().iter().cloned())
            .enumerate()
            .collect();
        let total = pending.len();

        tracing::debug!(
            dataset_id = %dataset.dataset_id,
            run_id = %dataset.run_id,
            cases = total,
            concurrency_limit = self.config.concurrency_limit,
            "Starting evaluation"
        );

        let scorers = Arc::new(self.scorers.clone());
        let mut pool = JoinSet::new();

        while pool.len() < self.config.concurrency_limit {
            let Some((index, case)) = pending.pop_front() else {
                break;
            };
            pool.spawn(run_unit(index, case, Arc::clone(&target), Arc::clone(&scorers)));
        }

        let mut results = Vec::with_capacity(total);
        while let Some(joined) = pool.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) if e.is_cancelled() => Err(EvalLoopError::Cancelled(e.to_string())),
                Err(e) => Err(EvalLoopError::TaskJoin(e.to_string())),
            };

            match outcome {
                Ok(case_result) => {
                    tracing::debug!(case_index = case_result.index, "Evaluation unit complete");
                    results.push(case_result);
                    if let Some((index, case)) = pending.pop_front() {
                        pool.spawn(run_unit(index, case, Arc::clone(&target), Arc::clone(&scorers)));
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, in_flight = pool.len(), "Evaluation unit failed, cancelling batch");
                    pool.abort_all();
                    while pool.join_next().await.is_some() {}
                    return Err(e);
                }
            }
        }

        results.sort_by_key(|r| r.index);

        let summary = self
            .scorers
            .iter()
            .map(|s| (s.name().to_string(), s.summarize(&results)))
            .collect::<BTreeMap<_, _>>();

        log::info!(
            "Evaluated {} cases of dataset {} ({} scorers)",
            results.len(),
            dataset.dataset_id,
            self.scorers.len()
        );

        Ok(EvalResult {
            dataset_id: dataset.dataset_id.clone(),
            run_id: dataset.run_id.clone(),
            summary,
            eval_case_results: results,
        })
    }

    /// Evaluate and persist the dataset, the result and a run record.
    ///
    /// The run record is written as `running` before evaluation starts and
    /// updated to `complete` or `failed` afterwards.
    pub async fn evaluate_and_record(
        &self,
        dataset: &EvalDataset,
        target: Arc<dyn EvalTarget>,
        storage: &dyn Storage,
    ) -> Result<EvalResult> {
        let run_id = dataset.run_id.as_str();
        let mut run = EvalRunRecord {
            run_id: run_id.to_string(),
            dataset_id: dataset.dataset_id.clone(),
            status: EvalRunStatus::Running,
            case_count: dataset.len() * self.config.repeat_times,
            started_at: now_ms(),
            finished_at: None,
            error: None,
        };
        storage.record_typed(DATASETS, run_id, dataset)?;
        storage.record_typed(RUNS, run_id, &run)?;

        let outcome = self.evaluate(dataset, target).await;
        run.finished_at = Some(now_ms());

        match outcome {
            Ok(result) => {
                storage.record_typed(RESULTS, run_id, &result)?;
                run.status = EvalRunStatus::Complete;
                storage.record_typed(RUNS, run_id, &run)?;
                Ok(result)
            }
            Err(e) => {
                run.status = EvalRunStatus::Failed;
                run.error = Some(e.to_string());
                storage.record_typed(RUNS, run_id, &run)?;
                Err(e)
            }
        }
    }
}

/// One predict + score unit. Scorers run sequentially within the unit.
async fn run_unit(
    index: usize,
    case: EvalDataCase,
    target: Arc<dyn EvalTarget>,
    scorers: Arc<Vec<Arc<dyn Scorer>>>,
) -> Result<EvalCaseResult> {
    let output = target.predict(&case).await.map_err(|e| match e {
        EvalLoopError::Predict { message, .. } => EvalLoopError::Predict { index, message },
        other => EvalLoopError::Predict {
            index,
            message: other.to_string(),
        },
    })?;

    let mut scorer_results = BTreeMap::new();
    for scorer in scorers.iter() {
        let result = scorer.scorer_and_judge(index, &case, &output).await?;
        scorer_results.insert(scorer.name().to_string(), result);
    }

    Ok(EvalCaseResult {
        index,
        case,
        output,
        scorer_results,
    })
}
