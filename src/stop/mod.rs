//! Stop-condition detection.
//!
//! A [`CompositeStopDetector`] is consulted once per iteration with a
//! [`StopState`] snapshot and answers with a [`StopDecision`]. Individual
//! detectors are isolated: one that errors or panics is logged and skipped.

mod composite;
mod conditions;
mod detector;
mod resources;
mod types;

pub use composite::CompositeStopDetector;
pub use conditions::{
    CompletionDetector, ConsecutiveFailuresDetector, CustomStopDetector, EndlessLoopDetector,
    InterruptFlag, MaxCostDetector, MaxIterationsDetector, ResourceExhaustedDetector,
    TimeoutDetector, UserInterruptDetector,
};
pub use detector::{
    PRIORITY_COMPLETION, PRIORITY_FAILURE, PRIORITY_INTERRUPT, PRIORITY_LIMIT, PRIORITY_SYSTEM,
    StopDetector, safe_check,
};
pub use resources::{ResourceProbe, ResourceSnapshot, SystemResourceProbe};
pub use types::{CompletionCriteria, StopDecision, StopState, StopType};
