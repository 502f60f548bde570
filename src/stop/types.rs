//! Stop state snapshots and stop decisions.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::{Config, LoopConfig};
use crate::controller::LoopState;

/// Why a loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StopType {
    Completed,
    MaxIterations,
    Timeout,
    MaxCost,
    MaxConsecutiveFailures,
    UserInterrupt,
    ResourceExhausted,
    EndlessLoop,
    CustomStop,
    SystemError,
}

impl StopType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopType::Completed => "completed",
            StopType::MaxIterations => "max_iterations",
            StopType::Timeout => "timeout",
            StopType::MaxCost => "max_cost",
            StopType::MaxConsecutiveFailures => "max_consecutive_failures",
            StopType::UserInterrupt => "user_interrupt",
            StopType::ResourceExhausted => "resource_exhausted",
            StopType::EndlessLoop => "endless_loop",
            StopType::CustomStop => "custom_stop",
            StopType::SystemError => "system_error",
        }
    }

    /// Only a completion counts as success.
    pub fn is_success(&self) -> bool {
        matches!(self, StopType::Completed)
    }
}

impl std::fmt::Display for StopType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Verdict of one stop check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopDecision {
    pub should_stop: bool,
    pub stop_type: Option<StopType>,
    pub reason: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl StopDecision {
    /// A decision to stop, with full confidence.
    pub fn stop(stop_type: StopType, reason: impl Into<String>) -> Self {
        Self {
            should_stop: true,
            stop_type: Some(stop_type),
            reason: reason.into(),
            confidence: 1.0,
            metadata: Map::new(),
        }
    }

    /// An abstention.
    pub fn proceed() -> Self {
        Self {
            should_stop: false,
            stop_type: None,
            reason: String::new(),
            confidence: 0.0,
            metadata: Map::new(),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

impl Default for StopDecision {
    fn default() -> Self {
        Self::proceed()
    }
}

/// Thresholds the built-in detectors compare against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompletionCriteria {
    pub max_iterations: u32,
    pub timeout: Duration,
    /// Cost budget; `0.0` disables the cost check.
    pub max_cost: f64,
    pub max_consecutive_failures: u32,
    pub confirmation_threshold: u32,
    /// `0` disables the endless-loop check.
    pub max_repeated_outputs: u32,
    pub min_available_memory_mb: Option<u64>,
    pub min_available_disk_mb: Option<u64>,
}

impl CompletionCriteria {
    pub fn from_config(config: &Config) -> Self {
        let mut criteria = Self::from(&config.loop_config());
        criteria.max_repeated_outputs = config.stop.max_repeated_outputs;
        criteria.min_available_memory_mb = config.stop.min_available_memory_mb;
        criteria.min_available_disk_mb = config.stop.min_available_disk_mb;
        criteria
    }
}

impl From<&LoopConfig> for CompletionCriteria {
    fn from(config: &LoopConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            timeout: Duration::from_secs_f64(config.timeout_seconds.max(0.0)),
            max_cost: config.max_cost,
            max_consecutive_failures: config.max_consecutive_failures,
            confirmation_threshold: config.confirmation_threshold,
            max_repeated_outputs: 3,
            min_available_memory_mb: None,
            min_available_disk_mb: None,
        }
    }
}

impl Default for CompletionCriteria {
    fn default() -> Self {
        Self::from(&LoopConfig::default())
    }
}

/// Read-only snapshot handed to every detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopState {
    pub loop_state: LoopState,
    pub criteria: CompletionCriteria,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl StopState {
    pub fn new(loop_state: LoopState, criteria: CompletionCriteria) -> Self {
        Self {
            loop_state,
            criteria,
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}
