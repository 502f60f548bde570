//! Bounded reflection history.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::types::{ReflectionResult, ReflectionType};

/// Most recent reflection results, oldest evicted first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectionHistory {
    capacity: usize,
    results: VecDeque<ReflectionResult>,
    /// Reflected iterations that succeeded.
    pub success_count: usize,
    /// Reflected iterations that failed.
    pub failure_count: usize,
}

impl ReflectionHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            results: VecDeque::with_capacity(capacity),
            success_count: 0,
            failure_count: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn record_outcome(&mut self, success: bool) {
        if success {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
    }

    pub fn push(&mut self, result: ReflectionResult) {
        if self.results.len() == self.capacity {
            self.results.pop_front();
        }
        self.results.push_back(result);
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReflectionResult> {
        self.results.iter()
    }

    /// The last `n` results, oldest first.
    pub fn recent(&self, n: usize) -> Vec<&ReflectionResult> {
        let skip = self.results.len().saturating_sub(n);
        self.results.iter().skip(skip).collect()
    }

    pub fn by_type(&self, reflection_type: ReflectionType) -> Vec<&ReflectionResult> {
        self.results
            .iter()
            .filter(|r| r.reflection_type == reflection_type)
            .collect()
    }

    /// Fraction of reflected iterations that succeeded.
    pub fn success_rate(&self) -> Option<f64> {
        let total = self.success_count + self.failure_count;
        (total > 0).then(|| self.success_count as f64 / total as f64)
    }

    pub fn clear(&mut self) {
        self.results.clear();
        self.success_count = 0;
        self.failure_count = 0;
    }
}

impl Default for ReflectionHistory {
    fn default() -> Self {
        Self::new(20)
    }
}
