//! Iteration controller.
//!
//! Each iteration:
//! 1. Checks the stop detector against a fresh snapshot (exit on stop)
//! 2. Executes the task; an executor error becomes a failed response
//! 3. Validates a successful response, if a validator is configured
//! 4. Reflects on the outcome and appends feedback to the next task
//!
//! The controller never decides to stop on its own. Failures surface through
//! the loop state counters and the stop detector acts on them.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::state::LoopState;
use super::task::{Task, TaskExecutor, TaskResponse};
use super::validator::IterationValidator;
use crate::config::LoopConfig;
use crate::error::{EvalLoopError, Result};
use crate::eval::Evaluator;
use crate::reflection::{ReflectionCoordinator, ReflectionInput, ValidationOutcome};
use crate::stop::{CompletionCriteria, CompositeStopDetector, StopDecision, StopState};

/// Controller lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerStatus {
    Initialized,
    Running,
    Terminated,
}

/// What happened in one iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: u32,
    pub response: TaskResponse,
    pub validation: Option<ValidationOutcome>,
    /// Whether the iteration counted as a success.
    pub success: bool,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

/// Terminal result of [`IterationController::run`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerOutcome {
    /// Response of the last executed iteration.
    pub response: Option<TaskResponse>,
    pub decision: StopDecision,
    /// Iterations actually executed.
    pub iterations: u32,
    pub state: LoopState,
    pub history: Vec<IterationRecord>,
}

impl ControllerOutcome {
    /// True when the loop stopped because the task was completed.
    pub fn completed(&self) -> bool {
        self.decision.stop_type.is_some_and(|t| t.is_success())
    }
}

/// Drives a task through repeated execute/validate/reflect iterations.
pub struct IterationController {
    executor: Arc<dyn TaskExecutor>,
    stop_detector: CompositeStopDetector,
    config: LoopConfig,
    criteria: CompletionCriteria,
    validator: Option<IterationValidator>,
    reflection: Option<ReflectionCoordinator>,
    status: ControllerStatus,
}

impl IterationController {
    pub fn new(executor: Arc<dyn TaskExecutor>, stop_detector: CompositeStopDetector, config: LoopConfig) -> Self {
        Self {
            executor,
            stop_detector,
            criteria: CompletionCriteria::from(&config),
            config,
            validator: None,
            reflection: None,
            status: ControllerStatus::Initialized,
        }
    }

    /// Validate each successful response with `evaluator`.
    pub fn with_validator(mut self, evaluator: Evaluator) -> Self {
        self.validator = Some(IterationValidator::new(evaluator));
        self
    }

    pub fn with_reflection(mut self, coordinator: ReflectionCoordinator) -> Self {
        self.reflection = Some(coordinator);
        self
    }

    /// Override the thresholds handed to the stop detector.
    pub fn with_criteria(mut self, criteria: CompletionCriteria) -> Self {
        self.criteria = criteria;
        self
    }

    pub fn status(&self) -> ControllerStatus {
        self.status
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Detector access between runs.
    pub fn stop_detector_mut(&mut self) -> &mut CompositeStopDetector {
        &mut self.stop_detector
    }

    pub fn reflection(&self) -> Option<&ReflectionCoordinator> {
        self.reflection.as_ref()
    }

    /// Iterate on `task` until the stop detector says stop.
    pub async fn run(&mut self, task: Task) -> Result<ControllerOutcome> {
        if self.config.max_iterations == 0 {
            return Err(EvalLoopError::InvalidConfig("max_iterations must be > 0".to_string()));
        }

        self.status = ControllerStatus::Running;
        let started = Instant::now();
        let mut state = LoopState::new(self.criteria.confirmation_threshold);
        let mut task = task;
        let mut last_response: Option<TaskResponse> = None;
        let mut history: Vec<IterationRecord> = Vec::new();

        log::info!("Starting iteration loop for task {}", task.id);

        let decision = loop {
            state.iteration += 1;
            let iteration = state.iteration;

            let stop_state = StopState::new(state.snapshot(started), self.criteria)
                .with_metadata("task_id", json!(task.id));
            let decision = self.stop_detector.should_stop(&stop_state);
            if decision.should_stop {
                break decision;
            }

            tracing::debug!(task_id = %task.id, iteration, "Executing iteration");
            let response = match self.executor.execute(&task).await {
                Ok(response) => response,
                Err(e) => {
                    log::warn!("Iteration {} execution failed: {}", iteration, e);
                    TaskResponse::failure(e.to_string())
                }
            };
            state.add_cost(response.cost);
            update_repeats(&mut state, last_response.as_ref(), &response);

            let (success, validation) = self.assess(&task, &response, iteration).await;
            if success {
                state.record_success();
            } else {
                state.record_failure();
            }

            tracing::info!(
                task_id = %task.id,
                iteration,
                success,
                consecutive_failures = state.consecutive_failures,
                total_cost = state.total_cost,
                "Iteration complete"
            );

            let suggestions = self
                .reflect(&mut task, &response, &history, iteration, success, validation.as_ref())
                .await;

            history.push(IterationRecord {
                iteration,
                response: response.clone(),
                validation,
                success,
                suggestions,
            });
            last_response = Some(response);
        };

        self.status = ControllerStatus::Terminated;
        log::info!(
            "Task {} terminated after {} iteration(s): {}",
            task.id,
            history.len(),
            decision.reason
        );

        Ok(ControllerOutcome {
            response: last_response,
            decision,
            iterations: history.len() as u32,
            state: state.snapshot(started),
            history,
        })
    }

    /// Decide whether an iteration succeeded.
    ///
    /// Without a validator a successful execution counts. A validator error
    /// is treated as a failed validation.
    async fn assess(
        &self,
        task: &Task,
        response: &TaskResponse,
        iteration: u32,
    ) -> (bool, Option<ValidationOutcome>) {
        if !response.success {
            return (false, None);
        }
        let Some(validator) = &self.validator else {
            return (true, None);
        };

        match validator.validate(task, response, iteration).await {
            Ok(result) => {
                let outcome = ValidationOutcome::from(&result);
                if !outcome.passed {
                    log::debug!(
                        "Iteration {} failed validation: {}",
                        iteration,
                        outcome.failed_metrics.join(", ")
                    );
                }
                (outcome.passed, Some(outcome))
            }
            Err(e) => {
                log::warn!("Iteration {} validation error: {}", iteration, e);
                (false, None)
            }
        }
    }

    /// Run reflection and append its feedback to `task` for the next iteration.
    async fn reflect(
        &mut self,
        task: &mut Task,
        response: &TaskResponse,
        history: &[IterationRecord],
        iteration: u32,
        success: bool,
        validation: Option<&ValidationOutcome>,
    ) -> Vec<String> {
        let Some(coordinator) = self.reflection.as_mut() else {
            return Vec::new();
        };

        let prior_attempts = history.iter().map(|r| r.response.answer.clone()).collect();
        let mut input = ReflectionInput::new(iteration, task.render(), success).with_prior_attempts(prior_attempts);
        if !response.answer.is_empty() {
            input = input.with_output(response.answer.as_str());
        }
        if let Some(error) = &response.error {
            input = input.with_error(error.as_str());
        }
        if let Some(validation) = validation {
            input = input.with_validation(validation.clone());
        }

        let results = coordinator.reflect(&input).await;
        if let Some(feedback) = coordinator.feedback(iteration, &results) {
            task.context.push(feedback);
        }
        coordinator.suggestions(&results)
    }
}

/// Count consecutive identical non-empty answers.
fn update_repeats(state: &mut LoopState, previous: Option<&TaskResponse>, current: &TaskResponse) {
    let repeated = !current.answer.is_empty()
        && previous.is_some_and(|p| p.answer.trim() == current.answer.trim());
    if repeated {
        state.repeated_outputs += 1;
    } else {
        state.repeated_outputs = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::{EvaluatorConfig, TaskSuccessScorer};
    use crate::stop::{InterruptFlag, StopType};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Executor replaying a script of outcomes, then repeating the last one.
    struct ScriptedExecutor {
        script: Vec<std::result::Result<TaskResponse, String>>,
        calls: AtomicU32,
        seen: Mutex<Vec<String>>,
    }

    impl ScriptedExecutor {
        fn new(script: Vec<std::result::Result<TaskResponse, String>>) -> Self {
            Self {
                script,
                calls: AtomicU32::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TaskExecutor for ScriptedExecutor {
        async fn execute(&self, task: &Task) -> Result<TaskResponse> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            self.seen.lock().unwrap().push(task.render());
            let step = self.script.get(n).or(self.script.last());
            match step {
                Some(Ok(response)) => Ok(response.clone()),
                Some(Err(message)) => Err(EvalLoopError::Executor(message.clone())),
                None => Ok(TaskResponse::failure("empty script")),
            }
        }
    }

    fn config() -> LoopConfig {
        LoopConfig {
            max_iterations: 10,
            max_consecutive_failures: 3,
            confirmation_threshold: 1,
            ..LoopConfig::default()
        }
    }

    fn controller(executor: Arc<ScriptedExecutor>, config: LoopConfig) -> IterationController {
        let criteria = CompletionCriteria::from(&config);
        let detector = CompositeStopDetector::with_defaults(&criteria, InterruptFlag::new());
        IterationController::new(executor, detector, config)
    }

    #[tokio::test]
    async fn test_completes_on_first_success() {
        let executor = Arc::new(ScriptedExecutor::new(vec![Ok(TaskResponse::success("done"))]));
        let mut controller = controller(executor.clone(), config());
        assert_eq!(controller.status(), ControllerStatus::Initialized);

        let outcome = controller.run(Task::new("do it")).await.unwrap();

        assert!(outcome.completed());
        assert_eq!(outcome.decision.stop_type, Some(StopType::Completed));
        assert_eq!(outcome.iterations, 1);
        assert_eq!(executor.calls(), 1);
        assert_eq!(outcome.response.unwrap().answer, "done");
        assert_eq!(controller.status(), ControllerStatus::Terminated);
    }

    #[tokio::test]
    async fn test_terminates_on_consecutive_failures() {
        let executor = Arc::new(ScriptedExecutor::new(vec![Ok(TaskResponse::failure("nope"))]));
        let mut controller = controller(executor.clone(), config());

        let outcome = controller.run(Task::new("do it")).await.unwrap();

        assert_eq!(outcome.decision.stop_type, Some(StopType::MaxConsecutiveFailures));
        assert!(!outcome.completed());
        assert_eq!(outcome.iterations, 3);
        assert_eq!(outcome.state.consecutive_failures, 3);
        assert_eq!(executor.calls(), 3);
    }

    #[tokio::test]
    async fn test_executor_error_is_a_failed_iteration() {
        let executor = Arc::new(ScriptedExecutor::new(vec![
            Err("crashed".into()),
            Ok(TaskResponse::success("recovered")),
        ]));
        let mut controller = controller(executor.clone(), config());

        let outcome = controller.run(Task::new("do it")).await.unwrap();

        assert!(outcome.completed());
        assert_eq!(outcome.iterations, 2);
        let first = &outcome.history[0];
        assert!(!first.success);
        assert!(first.response.error.as_deref().unwrap().contains("crashed"));
        assert_eq!(outcome.state.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_max_iterations() {
        let executor = Arc::new(ScriptedExecutor::new(vec![
            Ok(TaskResponse::failure("a")),
            Ok(TaskResponse::success("b")),
        ]));
        let config = LoopConfig {
            max_iterations: 4,
            confirmation_threshold: 10,
            ..config()
        };
        let mut controller = controller(executor.clone(), config);

        let outcome = controller.run(Task::new("do it")).await.unwrap();

        assert_eq!(outcome.decision.stop_type, Some(StopType::MaxIterations));
        assert_eq!(outcome.iterations, 4);
        assert_eq!(executor.calls(), 4);
    }

    #[tokio::test]
    async fn test_validation_failure_counts_as_failure() {
        let executor = Arc::new(ScriptedExecutor::new(vec![Ok(TaskResponse::success("5"))]));
        let validator = Evaluator::new(EvaluatorConfig::default()).with_scorer(
            crate::eval::ExactMatchScorer::new()
                .with_criteria(crate::eval::EvalCriteria::new("exact_match").with_threshold(1.0)),
        );
        let mut controller = controller(executor.clone(), config()).with_validator(validator);

        let outcome = controller.run(Task::new("2+2?").with_expected("4")).await.unwrap();

        assert_eq!(outcome.decision.stop_type, Some(StopType::MaxConsecutiveFailures));
        let validation = outcome.history[0].validation.as_ref().unwrap();
        assert!(!validation.passed);
        assert_eq!(validation.failed_metrics, vec!["exact_match.exact_match".to_string()]);
    }

    #[tokio::test]
    async fn test_validated_success_confirms() {
        let executor = Arc::new(ScriptedExecutor::new(vec![Ok(TaskResponse::success("ok"))]));
        let validator = Evaluator::new(EvaluatorConfig::default()).with_scorer(TaskSuccessScorer::new());
        let config = LoopConfig {
            confirmation_threshold: 2,
            ..config()
        };
        let mut controller = controller(executor.clone(), config).with_validator(validator);

        let outcome = controller.run(Task::new("do it")).await.unwrap();

        assert!(outcome.completed());
        assert_eq!(outcome.state.confirmations, 2);
        assert_eq!(outcome.iterations, 2);
        assert!(outcome.history.iter().all(|r| r.validation.as_ref().is_some_and(|v| v.passed)));
    }

    #[tokio::test]
    async fn test_validator_error_is_feedback() {
        // Exact match without an expected answer makes the scorer fail.
        let executor = Arc::new(ScriptedExecutor::new(vec![Ok(TaskResponse::success("x"))]));
        let validator = Evaluator::new(EvaluatorConfig::default()).with_scorer(crate::eval::ExactMatchScorer::new());
        let mut controller = controller(executor, config()).with_validator(validator);

        let outcome = controller.run(Task::new("do it")).await.unwrap();

        assert_eq!(outcome.decision.stop_type, Some(StopType::MaxConsecutiveFailures));
        assert!(outcome.history.iter().all(|r| !r.success && r.validation.is_none()));
    }

    #[tokio::test]
    async fn test_reflection_feeds_next_iteration() {
        let executor = Arc::new(ScriptedExecutor::new(vec![
            Err("disk full".into()),
            Ok(TaskResponse::success("fixed")),
        ]));
        let mut controller =
            controller(executor.clone(), config()).with_reflection(ReflectionCoordinator::default());

        let outcome = controller.run(Task::new("write file")).await.unwrap();

        assert!(outcome.completed());
        let seen = executor.seen.lock().unwrap();
        assert_eq!(seen[0], "write file");
        assert!(seen[1].starts_with("write file\n\n## Previous Iteration Feedback"));
        assert!(seen[1].contains("disk full"));
        assert!(!outcome.history[0].suggestions.is_empty());
        assert_eq!(controller.reflection().unwrap().history().failure_count, 1);
    }

    #[tokio::test]
    async fn test_cost_budget_stops() {
        let executor = Arc::new(ScriptedExecutor::new(vec![Ok(TaskResponse::failure("expensive").with_cost(0.6))]));
        let config = LoopConfig {
            max_cost: 1.0,
            max_consecutive_failures: 0,
            ..config()
        };
        let mut controller = controller(executor.clone(), config);

        let outcome = controller.run(Task::new("do it")).await.unwrap();

        assert_eq!(outcome.decision.stop_type, Some(StopType::MaxCost));
        assert_eq!(outcome.iterations, 2);
        assert!((outcome.state.total_cost - 1.2).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_repeated_answers_stop_endless_loop() {
        let executor = Arc::new(ScriptedExecutor::new(vec![Ok(
            TaskResponse::failure("wrong").with_answer("same"),
        )]));
        let config = LoopConfig {
            max_consecutive_failures: 0,
            max_iterations: 50,
            ..config()
        };
        let mut controller = controller(executor.clone(), config);

        let outcome = controller.run(Task::new("do it")).await.unwrap();

        assert_eq!(outcome.decision.stop_type, Some(StopType::EndlessLoop));
        assert_eq!(outcome.state.repeated_outputs, 3);
        assert_eq!(outcome.iterations, 4);
    }

    #[tokio::test]
    async fn test_stable_answer_reaches_completion() {
        let executor = Arc::new(ScriptedExecutor::new(vec![Ok(TaskResponse::success("same"))]));
        let config = LoopConfig {
            confirmation_threshold: 5,
            ..config()
        };
        let mut controller = controller(executor.clone(), config);

        let outcome = controller.run(Task::new("do it")).await.unwrap();

        assert_eq!(outcome.decision.stop_type, Some(StopType::Completed));
        assert_eq!(outcome.iterations, 5);
        assert_eq!(outcome.state.confirmations, 5);
        assert_eq!(outcome.state.repeated_outputs, 0);
    }

    #[tokio::test]
    async fn test_criteria_threshold_overrides_config() {
        let executor = Arc::new(ScriptedExecutor::new(vec![Ok(TaskResponse::success("ok"))]));
        let criteria = CompletionCriteria {
            confirmation_threshold: 3,
            ..CompletionCriteria::from(&config())
        };
        let mut controller = controller(executor.clone(), config()).with_criteria(criteria);

        let outcome = controller.run(Task::new("do it")).await.unwrap();

        assert_eq!(outcome.decision.stop_type, Some(StopType::Completed));
        assert_eq!(outcome.iterations, 3);
        assert_eq!(outcome.state.confirmations, 3);
        assert_eq!(executor.calls(), 3);
    }

    #[tokio::test]
    async fn test_disabled_detector_is_skipped() {
        let executor = Arc::new(ScriptedExecutor::new(vec![Ok(
            TaskResponse::failure("wrong").with_answer("same"),
        )]));
        let config = LoopConfig {
            max_consecutive_failures: 0,
            max_iterations: 5,
            ..config()
        };
        let mut controller = controller(executor.clone(), config);
        assert!(controller.stop_detector_mut().disable_condition("endless_loop"));

        let outcome = controller.run(Task::new("do it")).await.unwrap();

        assert_eq!(outcome.decision.stop_type, Some(StopType::MaxIterations));
        assert_eq!(outcome.iterations, 5);
        assert_eq!(outcome.state.repeated_outputs, 4);
    }

    #[tokio::test]
    async fn test_interrupt_before_first_iteration() {
        let executor = Arc::new(ScriptedExecutor::new(vec![Ok(TaskResponse::success("x"))]));
        let flag = InterruptFlag::new();
        let criteria = CompletionCriteria::from(&config());
        let detector = CompositeStopDetector::with_defaults(&criteria, flag.clone());
        let mut controller = IterationController::new(executor.clone(), detector, config());

        flag.raise();
        let outcome = controller.run(Task::new("do it")).await.unwrap();

        assert_eq!(outcome.decision.stop_type, Some(StopType::UserInterrupt));
        assert_eq!(outcome.iterations, 0);
        assert!(outcome.response.is_none());
        assert_eq!(executor.calls(), 0);
    }

    #[tokio::test]
    async fn test_zero_max_iterations_rejected() {
        let executor = Arc::new(ScriptedExecutor::new(vec![]));
        let config = LoopConfig {
            max_iterations: 0,
            ..config()
        };
        let mut controller = controller(executor, config);
        assert!(controller.run(Task::new("x")).await.is_err());
    }

    #[test]
    fn test_update_repeats() {
        let mut state = LoopState::default();
        let a = TaskResponse::success("a");
        update_repeats(&mut state, None, &a);
        assert_eq!(state.repeated_outputs, 0);
        update_repeats(&mut state, Some(&a), &a);
        update_repeats(&mut state, Some(&a), &TaskResponse::success(" a "));
        assert_eq!(state.repeated_outputs, 2);
        update_repeats(&mut state, Some(&a), &TaskResponse::success("b"));
        assert_eq!(state.repeated_outputs, 0);
        let empty = TaskResponse::failure("x");
        update_repeats(&mut state, Some(&empty), &empty);
        assert_eq!(state.repeated_outputs, 0);
    }
}
