//! Evaluation: datasets, scorers, summaries and the bounded-concurrency evaluator.

pub mod dataset;
pub mod evaluator;
pub mod metric;
pub mod registry;
pub mod result;
pub mod scorer;
pub mod scorers;
pub mod summary;
pub mod target;

pub use dataset::{CaseData, EvalDataCase, EvalDataset};
pub use evaluator::{Evaluator, EvaluatorConfig};
pub use metric::{EvalCriteria, EvalStatus, MetricResult, MetricValue};
pub use registry::{ScorerRegistry, ScorerSpec};
pub use result::{EvalCaseResult, EvalResult, EvalRunRecord, EvalRunStatus};
pub use scorer::{Scorer, ScorerResult};
pub use scorers::{ExactMatchScorer, TaskSuccessScorer};
pub use summary::{MetricSummary, ScorerSummary};
pub use target::{EvalTarget, RecordedOutputTarget};
