//! Built-in stop detectors.
//!
//! Every detector here is side-effect free except [`UserInterruptDetector`],
//! which clears its [`InterruptFlag`] when it fires.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::json;

use super::detector::{
    PRIORITY_COMPLETION, PRIORITY_FAILURE, PRIORITY_INTERRUPT, PRIORITY_LIMIT, PRIORITY_SYSTEM,
    StopDetector,
};
use super::resources::{ResourceProbe, SystemResourceProbe};
use super::types::{StopDecision, StopState, StopType};
use crate::error::Result;

/// Stops once enough iterations have been confirmed by validation.
#[derive(Debug, Default, Clone, Copy)]
pub struct CompletionDetector;

impl StopDetector for CompletionDetector {
    fn name(&self) -> &str {
        "completion"
    }

    fn priority(&self) -> i32 {
        PRIORITY_COMPLETION
    }

    fn check(&self, state: &StopState) -> Result<StopDecision> {
        let loop_state = &state.loop_state;
        let threshold = state.criteria.confirmation_threshold.max(1);
        if loop_state.confirmations >= threshold {
            return Ok(StopDecision::stop(
                StopType::Completed,
                format!("Task confirmed by {} successful validation(s)", loop_state.confirmations),
            )
            .with_metadata("confirmations", json!(loop_state.confirmations)));
        }
        Ok(StopDecision::proceed())
    }
}

/// Stops before an iteration past `criteria.max_iterations` would start.
#[derive(Debug, Default, Clone, Copy)]
pub struct MaxIterationsDetector;

impl StopDetector for MaxIterationsDetector {
    fn name(&self) -> &str {
        "max_iterations"
    }

    fn priority(&self) -> i32 {
        PRIORITY_LIMIT
    }

    fn check(&self, state: &StopState) -> Result<StopDecision> {
        let max = state.criteria.max_iterations;
        if state.loop_state.iteration > max {
            return Ok(StopDecision::stop(
                StopType::MaxIterations,
                format!("Reached maximum iterations ({})", max),
            ));
        }
        Ok(StopDecision::proceed())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TimeoutDetector;

impl StopDetector for TimeoutDetector {
    fn name(&self) -> &str {
        "timeout"
    }

    fn priority(&self) -> i32 {
        PRIORITY_LIMIT
    }

    fn check(&self, state: &StopState) -> Result<StopDecision> {
        let elapsed = state.loop_state.elapsed;
        let timeout = state.criteria.timeout;
        if elapsed >= timeout {
            return Ok(StopDecision::stop(
                StopType::Timeout,
                format!(
                    "Elapsed {:.1}s exceeds timeout of {:.1}s",
                    elapsed.as_secs_f64(),
                    timeout.as_secs_f64()
                ),
            )
            .with_metadata("elapsed_seconds", json!(elapsed.as_secs_f64())));
        }
        Ok(StopDecision::proceed())
    }
}

/// Stops when cumulative cost reaches the budget. A budget of `0.0` disables it.
#[derive(Debug, Default, Clone, Copy)]
pub struct MaxCostDetector;

impl StopDetector for MaxCostDetector {
    fn name(&self) -> &str {
        "max_cost"
    }

    fn priority(&self) -> i32 {
        PRIORITY_LIMIT
    }

    fn check(&self, state: &StopState) -> Result<StopDecision> {
        let budget = state.criteria.max_cost;
        let spent = state.loop_state.total_cost;
        if budget > 0.0 && spent >= budget {
            return Ok(StopDecision::stop(
                StopType::MaxCost,
                format!("Cost {:.4} reached budget {:.4}", spent, budget),
            )
            .with_metadata("total_cost", json!(spent)));
        }
        Ok(StopDecision::proceed())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ConsecutiveFailuresDetector;

impl StopDetector for ConsecutiveFailuresDetector {
    fn name(&self) -> &str {
        "consecutive_failures"
    }

    fn priority(&self) -> i32 {
        PRIORITY_FAILURE
    }

    fn check(&self, state: &StopState) -> Result<StopDecision> {
        let limit = state.criteria.max_consecutive_failures;
        let failures = state.loop_state.consecutive_failures;
        if limit > 0 && failures >= limit {
            return Ok(StopDecision::stop(
                StopType::MaxConsecutiveFailures,
                format!("{} consecutive failures (limit {})", failures, limit),
            )
            .with_metadata("consecutive_failures", json!(failures)));
        }
        Ok(StopDecision::proceed())
    }
}

/// Shared interrupt marker. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop at the next check.
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear the flag, returning whether it was set.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct UserInterruptDetector {
    flag: InterruptFlag,
}

impl UserInterruptDetector {
    pub fn new(flag: InterruptFlag) -> Self {
        Self { flag }
    }
}

impl StopDetector for UserInterruptDetector {
    fn name(&self) -> &str {
        "user_interrupt"
    }

    fn priority(&self) -> i32 {
        PRIORITY_INTERRUPT
    }

    fn check(&self, _state: &StopState) -> Result<StopDecision> {
        if self.flag.take() {
            return Ok(StopDecision::stop(StopType::UserInterrupt, "Interrupted by user"));
        }
        Ok(StopDecision::proceed())
    }
}

/// Stops when available memory or disk falls below a floor.
pub struct ResourceExhaustedDetector {
    probe: Box<dyn ResourceProbe>,
    min_memory_mb: Option<u64>,
    min_disk_mb: Option<u64>,
}

impl ResourceExhaustedDetector {
    pub fn new(min_memory_mb: Option<u64>, min_disk_mb: Option<u64>) -> Self {
        Self {
            probe: Box::new(SystemResourceProbe::new()),
            min_memory_mb,
            min_disk_mb,
        }
    }

    pub fn with_probe(mut self, probe: impl ResourceProbe + 'static) -> Self {
        self.probe = Box::new(probe);
        self
    }
}

impl StopDetector for ResourceExhaustedDetector {
    fn name(&self) -> &str {
        "resource_exhausted"
    }

    fn priority(&self) -> i32 {
        PRIORITY_SYSTEM
    }

    fn check(&self, _state: &StopState) -> Result<StopDecision> {
        if self.min_memory_mb.is_none() && self.min_disk_mb.is_none() {
            return Ok(StopDecision::proceed());
        }

        let snapshot = self.probe.sample()?;
        let checks = [
            ("memory", snapshot.available_memory_mb, self.min_memory_mb),
            ("disk", snapshot.available_disk_mb, self.min_disk_mb),
        ];
        for (resource, available, floor) in checks {
            if let (Some(available), Some(floor)) = (available, floor)
                && available < floor
            {
                return Ok(StopDecision::stop(
                    StopType::ResourceExhausted,
                    format!("Available {} {}MB below minimum {}MB", resource, available, floor),
                )
                .with_metadata("resource", json!(resource))
                .with_metadata("available_mb", json!(available)));
            }
        }
        Ok(StopDecision::proceed())
    }
}

/// Stops when the same answer keeps coming back.
#[derive(Debug, Default, Clone, Copy)]
pub struct EndlessLoopDetector;

impl StopDetector for EndlessLoopDetector {
    fn name(&self) -> &str {
        "endless_loop"
    }

    fn priority(&self) -> i32 {
        PRIORITY_LIMIT
    }

    fn check(&self, state: &StopState) -> Result<StopDecision> {
        let limit = state.criteria.max_repeated_outputs;
        let repeated = state.loop_state.repeated_outputs;
        if limit > 0 && repeated >= limit {
            return Ok(StopDecision::stop(
                StopType::EndlessLoop,
                format!("Identical output repeated {} times", repeated),
            )
            .with_confidence(0.9));
        }
        Ok(StopDecision::proceed())
    }
}

type Predicate = Box<dyn Fn(&StopState) -> Option<String> + Send + Sync>;

/// Caller-defined stop check. The closure returns a reason to stop.
pub struct CustomStopDetector {
    name: String,
    priority: i32,
    predicate: Predicate,
}

impl CustomStopDetector {
    pub fn new<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&StopState) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            priority: PRIORITY_COMPLETION,
            predicate: Box::new(predicate),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl StopDetector for CustomStopDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn check(&self, state: &StopState) -> Result<StopDecision> {
        Ok(match (self.predicate)(state) {
            Some(reason) => StopDecision::stop(StopType::CustomStop, reason)
                .with_metadata("detector", json!(self.name)),
            None => StopDecision::proceed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::LoopState;
    use crate::error::EvalLoopError;
    use crate::stop::resources::ResourceSnapshot;
    use crate::stop::types::CompletionCriteria;
    use std::time::Duration;

    fn state_with(f: impl FnOnce(&mut LoopState)) -> StopState {
        let mut loop_state = LoopState::default();
        f(&mut loop_state);
        StopState::new(loop_state, CompletionCriteria::default())
    }

    struct FixedProbe(ResourceSnapshot);

    impl ResourceProbe for FixedProbe {
        fn sample(&self) -> Result<ResourceSnapshot> {
            Ok(self.0)
        }
    }

    struct BrokenProbe;

    impl ResourceProbe for BrokenProbe {
        fn sample(&self) -> Result<ResourceSnapshot> {
            Err(EvalLoopError::Detector {
                name: "resource_exhausted".into(),
                message: "no sampler".into(),
            })
        }
    }

    #[test]
    fn test_consecutive_failures_stop_scenario() {
        let mut state = state_with(|s| s.consecutive_failures = 3);
        state.criteria.max_consecutive_failures = 3;

        let decision = ConsecutiveFailuresDetector.check(&state).unwrap();
        assert!(decision.should_stop);
        assert_eq!(decision.stop_type, Some(StopType::MaxConsecutiveFailures));
    }

    #[test]
    fn test_consecutive_failures_below_limit() {
        let state = state_with(|s| s.consecutive_failures = 2);
        assert!(!ConsecutiveFailuresDetector.check(&state).unwrap().should_stop);
    }

    #[test]
    fn test_completion_threshold() {
        let mut state = state_with(|s| s.confirmations = 1);
        state.criteria.confirmation_threshold = 2;
        assert!(!CompletionDetector.check(&state).unwrap().should_stop);

        state.loop_state.confirmations = 2;
        let decision = CompletionDetector.check(&state).unwrap();
        assert_eq!(decision.stop_type, Some(StopType::Completed));
    }

    #[test]
    fn test_completion_threshold_comes_from_criteria() {
        let mut state = state_with(|s| {
            s.confirmation_threshold = 1;
            s.confirmations = 1;
        });
        state.criteria.confirmation_threshold = 3;
        assert!(!CompletionDetector.check(&state).unwrap().should_stop);
    }

    #[test]
    fn test_completion_zero_threshold_needs_one_confirmation() {
        let mut state = state_with(|_| {});
        state.criteria.confirmation_threshold = 0;
        assert!(!CompletionDetector.check(&state).unwrap().should_stop);

        state.loop_state.confirmations = 1;
        assert!(CompletionDetector.check(&state).unwrap().should_stop);
    }

    #[test]
    fn test_max_iterations_allows_last_iteration() {
        let mut state = state_with(|s| s.iteration = 10);
        state.criteria.max_iterations = 10;
        assert!(!MaxIterationsDetector.check(&state).unwrap().should_stop);

        state.loop_state.iteration = 11;
        let decision = MaxIterationsDetector.check(&state).unwrap();
        assert_eq!(decision.stop_type, Some(StopType::MaxIterations));
    }

    #[test]
    fn test_timeout() {
        let mut state = state_with(|s| s.elapsed = Duration::from_secs(5));
        state.criteria.timeout = Duration::from_secs(10);
        assert!(!TimeoutDetector.check(&state).unwrap().should_stop);

        state.loop_state.elapsed = Duration::from_secs(10);
        let decision = TimeoutDetector.check(&state).unwrap();
        assert_eq!(decision.stop_type, Some(StopType::Timeout));
    }

    #[test]
    fn test_max_cost() {
        let mut state = state_with(|s| s.total_cost = 1.0);
        state.criteria.max_cost = 1.0;
        assert_eq!(
            MaxCostDetector.check(&state).unwrap().stop_type,
            Some(StopType::MaxCost)
        );

        state.criteria.max_cost = 0.0;
        assert!(!MaxCostDetector.check(&state).unwrap().should_stop);
    }

    #[test]
    fn test_user_interrupt_consumes_flag() {
        let flag = InterruptFlag::new();
        let detector = UserInterruptDetector::new(flag.clone());
        let state = state_with(|_| {});

        assert!(!detector.check(&state).unwrap().should_stop);

        flag.raise();
        assert!(flag.is_raised());
        let decision = detector.check(&state).unwrap();
        assert_eq!(decision.stop_type, Some(StopType::UserInterrupt));
        assert!(!flag.is_raised());

        assert!(!detector.check(&state).unwrap().should_stop);
    }

    #[test]
    fn test_resource_exhausted_memory_floor() {
        let detector = ResourceExhaustedDetector::new(Some(512), None).with_probe(FixedProbe(
            ResourceSnapshot {
                available_memory_mb: Some(100),
                available_disk_mb: None,
            },
        ));
        let decision = detector.check(&state_with(|_| {})).unwrap();
        assert_eq!(decision.stop_type, Some(StopType::ResourceExhausted));
        assert_eq!(decision.metadata["resource"], "memory");
    }

    #[test]
    fn test_resource_exhausted_disk_floor() {
        let detector = ResourceExhaustedDetector::new(Some(512), Some(1024)).with_probe(FixedProbe(
            ResourceSnapshot {
                available_memory_mb: Some(4096),
                available_disk_mb: Some(100),
            },
        ));
        let decision = detector.check(&state_with(|_| {})).unwrap();
        assert_eq!(decision.stop_type, Some(StopType::ResourceExhausted));
        assert_eq!(decision.metadata["resource"], "disk");
        assert_eq!(decision.metadata["available_mb"], 100);
    }

    #[test]
    fn test_resource_disk_floor_on_live_system() {
        let detector = ResourceExhaustedDetector::new(None, Some(u64::MAX))
            .with_probe(SystemResourceProbe::with_path("/"));
        let decision = detector.check(&state_with(|_| {})).unwrap();
        assert!(decision.should_stop);
        assert_eq!(decision.metadata["resource"], "disk");
    }

    #[test]
    fn test_resource_unknown_disk_does_not_stop() {
        let detector = ResourceExhaustedDetector::new(None, Some(1024))
            .with_probe(FixedProbe(ResourceSnapshot::default()));
        assert!(!detector.check(&state_with(|_| {})).unwrap().should_stop);
    }

    #[test]
    fn test_resource_without_floors_skips_sampling() {
        let detector = ResourceExhaustedDetector::new(None, None).with_probe(BrokenProbe);
        assert!(detector.check(&state_with(|_| {})).is_ok());
    }

    #[test]
    fn test_resource_sampling_error_propagates() {
        let detector = ResourceExhaustedDetector::new(Some(1), None).with_probe(BrokenProbe);
        assert!(detector.check(&state_with(|_| {})).is_err());
    }

    #[test]
    fn test_endless_loop() {
        let state = state_with(|s| s.repeated_outputs = 3);
        let decision = EndlessLoopDetector.check(&state).unwrap();
        assert_eq!(decision.stop_type, Some(StopType::EndlessLoop));

        let mut state = state;
        state.criteria.max_repeated_outputs = 0;
        assert!(!EndlessLoopDetector.check(&state).unwrap().should_stop);
    }

    #[test]
    fn test_custom_stop() {
        let detector = CustomStopDetector::new("cost_guard", |state: &StopState| {
            (state.loop_state.total_cost > 0.5).then(|| "too expensive".to_string())
        })
        .with_priority(PRIORITY_SYSTEM);

        assert_eq!(detector.name(), "cost_guard");
        assert_eq!(detector.priority(), PRIORITY_SYSTEM);
        assert!(!detector.check(&state_with(|_| {})).unwrap().should_stop);

        let decision = detector.check(&state_with(|s| s.total_cost = 0.75)).unwrap();
        assert_eq!(decision.stop_type, Some(StopType::CustomStop));
        assert_eq!(decision.reason, "too expensive");
    }
}
