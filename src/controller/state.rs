//! Per-run mutable loop state.
//!
//! Owned exclusively by the iteration controller. Other components only ever
//! see a copy taken with [`LoopState::snapshot`].

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Counters tracked across iterations of one run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoopState {
    /// Iteration about to run or running (1-based; 0 before the first).
    pub iteration: u32,
    pub started_at: DateTime<Utc>,
    /// Time since start, as of the last snapshot.
    pub elapsed: Duration,
    pub total_cost: f64,
    pub consecutive_failures: u32,
    /// Successful validations so far.
    pub confirmations: u32,
    pub confirmation_threshold: u32,
    /// Consecutive iterations whose answer equalled the previous one.
    pub repeated_outputs: u32,
}

impl LoopState {
    pub fn new(confirmation_threshold: u32) -> Self {
        Self {
            iteration: 0,
            started_at: Utc::now(),
            elapsed: Duration::ZERO,
            total_cost: 0.0,
            consecutive_failures: 0,
            confirmations: 0,
            confirmation_threshold,
            repeated_outputs: 0,
        }
    }

    /// Copy of the state with `elapsed` measured from `started`.
    pub fn snapshot(&self, started: Instant) -> Self {
        Self {
            elapsed: started.elapsed(),
            ..*self
        }
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures += 1;
    }

    /// A confirmed iteration is progress, so the failure and repeat streaks end.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.repeated_outputs = 0;
        self.confirmations += 1;
    }

    pub fn add_cost(&mut self, cost: f64) {
        if cost.is_finite() && cost > 0.0 {
            self.total_cost += cost;
        }
    }
}

impl Default for LoopState {
    fn default() -> Self {
        Self::new(1)
    }
}
