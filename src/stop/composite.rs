//! Composite stop detector.
//!
//! Holds an ordered list of detectors and returns the first decision that says
//! stop. Detectors behind it are never consulted.

use super::conditions::{
    CompletionDetector, ConsecutiveFailuresDetector, EndlessLoopDetector, InterruptFlag,
    MaxCostDetector, MaxIterationsDetector, ResourceExhaustedDetector, TimeoutDetector,
    UserInterruptDetector,
};
use super::detector::{StopDetector, safe_check};
use super::types::{CompletionCriteria, StopDecision, StopState};

struct Registered {
    detector: Box<dyn StopDetector>,
    enabled: bool,
}

/// Priority-ordered set of stop detectors.
///
/// Mutation takes `&mut self`, so it cannot overlap an in-flight
/// [`should_stop`](Self::should_stop).
pub struct CompositeStopDetector {
    conditions: Vec<Registered>,
}

impl CompositeStopDetector {
    pub fn new() -> Self {
        Self {
            conditions: Vec::new(),
        }
    }

    /// All built-in detectors wired to `criteria` and `interrupt`.
    ///
    /// The resource detector is only added when a floor is configured.
    pub fn with_defaults(criteria: &CompletionCriteria, interrupt: InterruptFlag) -> Self {
        let mut composite = Self::new();
        if criteria.min_available_memory_mb.is_some() || criteria.min_available_disk_mb.is_some() {
            composite.add_condition(ResourceExhaustedDetector::new(
                criteria.min_available_memory_mb,
                criteria.min_available_disk_mb,
            ));
        }
        composite.add_condition(UserInterruptDetector::new(interrupt));
        composite.add_condition(ConsecutiveFailuresDetector);
        composite.add_condition(CompletionDetector);
        composite.add_condition(MaxIterationsDetector);
        composite.add_condition(TimeoutDetector);
        composite.add_condition(MaxCostDetector);
        composite.add_condition(EndlessLoopDetector);
        composite
    }

    /// Builder form of [`add_condition`](Self::add_condition).
    pub fn with_condition(mut self, detector: impl StopDetector + 'static) -> Self {
        self.add_condition(detector);
        self
    }

    pub fn add_condition(&mut self, detector: impl StopDetector + 'static) {
        self.add_boxed(Box::new(detector));
    }

    /// Register a detector, enabled. Equal priorities keep insertion order.
    pub fn add_boxed(&mut self, detector: Box<dyn StopDetector>) {
        log::debug!(
            "Adding stop condition '{}' (priority {})",
            detector.name(),
            detector.priority()
        );
        self.conditions.push(Registered {
            detector,
            enabled: true,
        });
        self.conditions.sort_by_key(|c| c.detector.priority());
    }

    /// Remove every detector named `name`. Returns whether any was removed.
    pub fn remove_condition(&mut self, name: &str) -> bool {
        let before = self.conditions.len();
        self.conditions.retain(|c| c.detector.name() != name);
        self.conditions.len() != before
    }

    pub fn enable_condition(&mut self, name: &str) -> bool {
        self.set_enabled(name, true)
    }

    pub fn disable_condition(&mut self, name: &str) -> bool {
        self.set_enabled(name, false)
    }

    fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        let mut found = false;
        for condition in self.conditions.iter_mut().filter(|c| c.detector.name() == name) {
            condition.enabled = enabled;
            found = true;
        }
        found
    }

    pub fn is_enabled(&self, name: &str) -> Option<bool> {
        self.conditions
            .iter()
            .find(|c| c.detector.name() == name)
            .map(|c| c.enabled)
    }

    /// Detector names in check order.
    pub fn condition_names(&self) -> Vec<&str> {
        self.conditions.iter().map(|c| c.detector.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// First stopping decision in priority order, or a decision to continue.
    pub fn should_stop(&self, state: &StopState) -> StopDecision {
        for condition in self.conditions.iter().filter(|c| c.enabled) {
            let decision = safe_check(condition.detector.as_ref(), state);
            if decision.should_stop {
                tracing::info!(
                    detector = condition.detector.name(),
                    stop_type = ?decision.stop_type,
                    iteration = state.loop_state.iteration,
                    "Stop condition triggered: {}",
                    decision.reason
                );
                return decision;
            }
        }
        StopDecision::proceed()
    }
}

impl Default for CompositeStopDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::LoopState;
    use crate::error::{EvalLoopError, Result};
    use crate::stop::detector::{PRIORITY_COMPLETION, PRIORITY_LIMIT, PRIORITY_SYSTEM};
    use crate::stop::types::StopType;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockDetector {
        name: String,
        priority: i32,
        stops: bool,
        calls: Arc<AtomicUsize>,
    }

    impl MockDetector {
        fn new(name: &str, priority: i32, stops: bool) -> Self {
            Self {
                name: name.to_string(),
                priority,
                stops,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn calls(&self) -> Arc<AtomicUsize> {
            self.calls.clone()
        }
    }

    impl StopDetector for MockDetector {
        fn name(&self) -> &str {
            &self.name
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        fn check(&self, _state: &StopState) -> Result<StopDecision> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.stops {
                Ok(StopDecision::stop(StopType::CustomStop, self.name.clone()))
            } else {
                Ok(StopDecision::proceed())
            }
        }
    }

    struct RaisingDetector;

    impl StopDetector for RaisingDetector {
        fn name(&self) -> &str {
            "raising"
        }

        fn priority(&self) -> i32 {
            PRIORITY_SYSTEM
        }

        fn check(&self, _state: &StopState) -> Result<StopDecision> {
            Err(EvalLoopError::Detector {
                name: "raising".into(),
                message: "always fails".into(),
            })
        }
    }

    struct PanickingDetector;

    impl StopDetector for PanickingDetector {
        fn name(&self) -> &str {
            "panicking"
        }

        fn priority(&self) -> i32 {
            PRIORITY_SYSTEM
        }

        fn check(&self, _state: &StopState) -> Result<StopDecision> {
            panic!("detector bug")
        }
    }

    fn state() -> StopState {
        StopState::new(LoopState::default(), CompletionCriteria::default())
    }

    #[test]
    fn test_empty_composite_continues() {
        let composite = CompositeStopDetector::new();
        assert!(composite.is_empty());
        assert!(!composite.should_stop(&state()).should_stop);
    }

    #[test]
    fn test_priority_short_circuit() {
        let high = MockDetector::new("high", PRIORITY_SYSTEM, true);
        let low = MockDetector::new("low", PRIORITY_LIMIT, true);
        let high_calls = high.calls();
        let low_calls = low.calls();

        // Registered low first; ordering comes from priority.
        let composite = CompositeStopDetector::new()
            .with_condition(low)
            .with_condition(high);

        for _ in 0..3 {
            let decision = composite.should_stop(&state());
            assert_eq!(decision.reason, "high");
        }
        assert_eq!(high_calls.load(Ordering::SeqCst), 3);
        assert_eq!(low_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let composite = CompositeStopDetector::new()
            .with_condition(MockDetector::new("first", PRIORITY_COMPLETION, true))
            .with_condition(MockDetector::new("second", PRIORITY_COMPLETION, true));

        assert_eq!(composite.condition_names(), vec!["first", "second"]);
        assert_eq!(composite.should_stop(&state()).reason, "first");
    }

    #[test]
    fn test_raising_detector_never_stops() {
        let composite = CompositeStopDetector::new().with_condition(RaisingDetector);
        for _ in 0..5 {
            assert!(!composite.should_stop(&state()).should_stop);
        }
    }

    #[test]
    fn test_raising_detector_does_not_block_others() {
        let composite = CompositeStopDetector::new()
            .with_condition(RaisingDetector)
            .with_condition(PanickingDetector)
            .with_condition(MockDetector::new("fires", PRIORITY_LIMIT, true));

        let decision = composite.should_stop(&state());
        assert!(decision.should_stop);
        assert_eq!(decision.reason, "fires");
    }

    #[test]
    fn test_disable_and_enable() {
        let detector = MockDetector::new("gate", PRIORITY_COMPLETION, true);
        let calls = detector.calls();
        let mut composite = CompositeStopDetector::new().with_condition(detector);

        assert!(composite.disable_condition("gate"));
        assert_eq!(composite.is_enabled("gate"), Some(false));
        assert!(!composite.should_stop(&state()).should_stop);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert!(composite.enable_condition("gate"));
        assert!(composite.should_stop(&state()).should_stop);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(!composite.disable_condition("missing"));
    }

    #[test]
    fn test_remove_condition() {
        let mut composite = CompositeStopDetector::new()
            .with_condition(MockDetector::new("a", PRIORITY_SYSTEM, true))
            .with_condition(MockDetector::new("b", PRIORITY_LIMIT, false));

        assert!(composite.remove_condition("a"));
        assert!(!composite.remove_condition("a"));
        assert_eq!(composite.condition_names(), vec!["b"]);
        assert!(!composite.should_stop(&state()).should_stop);
    }

    #[test]
    fn test_defaults_order() {
        let composite =
            CompositeStopDetector::with_defaults(&CompletionCriteria::default(), InterruptFlag::new());
        assert_eq!(
            composite.condition_names(),
            vec![
                "user_interrupt",
                "consecutive_failures",
                "completion",
                "max_iterations",
                "timeout",
                "max_cost",
                "endless_loop",
            ]
        );
    }

    #[test]
    fn test_defaults_include_resource_floor() {
        let criteria = CompletionCriteria {
            min_available_memory_mb: Some(64),
            ..CompletionCriteria::default()
        };
        let composite = CompositeStopDetector::with_defaults(&criteria, InterruptFlag::new());
        assert_eq!(composite.condition_names()[0], "resource_exhausted");
    }

    #[test]
    fn test_defaults_stop_scenario() {
        let composite =
            CompositeStopDetector::with_defaults(&CompletionCriteria::default(), InterruptFlag::new());
        let mut state = state();
        state.loop_state.consecutive_failures = 3;
        state.criteria.max_consecutive_failures = 3;

        let decision = composite.should_stop(&state);
        assert!(decision.should_stop);
        assert_eq!(decision.stop_type, Some(StopType::MaxConsecutiveFailures));
    }

    #[test]
    fn test_interrupt_beats_completion() {
        let flag = InterruptFlag::new();
        let composite = CompositeStopDetector::with_defaults(&CompletionCriteria::default(), flag.clone());
        let mut state = state();
        state.loop_state.confirmations = 1;

        flag.raise();
        assert_eq!(
            composite.should_stop(&state).stop_type,
            Some(StopType::UserInterrupt)
        );
        assert_eq!(
            composite.should_stop(&state).stop_type,
            Some(StopType::Completed)
        );
    }
}
