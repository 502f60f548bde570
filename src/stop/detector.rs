//! The stop detector seam and its fault-isolating wrapper.

use std::panic::{AssertUnwindSafe, catch_unwind};

use serde_json::json;

use super::types::{StopDecision, StopState};
use crate::error::Result;

/// System errors and resource exhaustion.
pub const PRIORITY_SYSTEM: i32 = 0;
/// User or external interrupts.
pub const PRIORITY_INTERRUPT: i32 = 1;
/// Failure streaks.
pub const PRIORITY_FAILURE: i32 = 2;
/// Normal completion and custom stops.
pub const PRIORITY_COMPLETION: i32 = 3;
/// Iteration, time, cost and repetition limits.
pub const PRIORITY_LIMIT: i32 = 4;

/// One independent check of whether the loop should halt.
///
/// Detectors are synchronous and must not keep state between calls; everything
/// they need is in the [`StopState`] snapshot. Lower priority runs first.
pub trait StopDetector: Send + Sync {
    fn name(&self) -> &str;

    fn priority(&self) -> i32;

    fn check(&self, state: &StopState) -> Result<StopDecision>;
}

/// Run a detector, turning errors and panics into a non-stopping decision.
///
/// The returned decision carries the failure under `metadata.error` and never
/// has `should_stop` set.
pub fn safe_check(detector: &dyn StopDetector, state: &StopState) -> StopDecision {
    let outcome = catch_unwind(AssertUnwindSafe(|| detector.check(state)));
    let message = match outcome {
        Ok(Ok(decision)) => return decision,
        Ok(Err(e)) => e.to_string(),
        Err(panic) => panic_message(panic.as_ref()),
    };

    log::warn!("Stop detector '{}' failed: {}", detector.name(), message);
    StopDecision::proceed()
        .with_metadata("detector", json!(detector.name()))
        .with_metadata("error", json!(message))
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}
