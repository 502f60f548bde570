//! Explicit scorer registry.
//!
//! Maps a stable string key to a factory. Populated from an explicit
//! registration list at startup.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::metric::EvalCriteria;
use super::scorer::Scorer;
use super::scorers::{ExactMatchScorer, TaskSuccessScorer};
use crate::error::{EvalLoopError, Result};

/// Declarative description of a scorer to build.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScorerSpec {
    pub key: String,
    #[serde(default)]
    pub options: Map<String, Value>,
    #[serde(default)]
    pub criteria: Vec<EvalCriteria>,
}

impl ScorerSpec {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Default::default()
        }
    }

    pub fn with_option(mut self, name: impl Into<String>, value: Value) -> Self {
        self.options.insert(name.into(), value);
        self
    }

    pub fn with_criteria(mut self, criteria: EvalCriteria) -> Self {
        self.criteria.push(criteria);
        self
    }

    fn bool_option(&self, name: &str) -> Option<bool> {
        self.options.get(name).and_then(|v| v.as_bool())
    }
}

/// Factory building a scorer from its spec.
pub type ScorerFactory = Box<dyn Fn(&ScorerSpec) -> Arc<dyn Scorer> + Send + Sync>;

/// Registry of scorer factories keyed by name.
#[derive(Default)]
pub struct ScorerRegistry {
    factories: HashMap<String, ScorerFactory>,
}

impl ScorerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry populated with the built-in scorers.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(ExactMatchScorer::NAME, |spec: &ScorerSpec| -> Arc<dyn Scorer> {
            let mut scorer = ExactMatchScorer::new();
            if spec.bool_option("case_sensitive") == Some(false) {
                scorer = scorer.case_insensitive();
            }
            for c in &spec.criteria {
                scorer = scorer.with_criteria(c.clone());
            }
            Arc::new(scorer)
        });
        registry.register(TaskSuccessScorer::NAME, |_spec: &ScorerSpec| -> Arc<dyn Scorer> {
            Arc::new(TaskSuccessScorer::new())
        });
        registry
    }

    /// Register a factory; replaces any factory under the same key.
    pub fn register<F>(&mut self, key: impl Into<String>, factory: F)
    where
        F: Fn(&ScorerSpec) -> Arc<dyn Scorer> + Send + Sync + 'static,
    {
        let key = key.into();
        if self.factories.insert(key.clone(), Box::new(factory)).is_some() {
            log::debug!("Replaced scorer factory '{}'", key);
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.factories.contains_key(key)
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Build the scorer described by `spec`.
    pub fn create(&self, spec: &ScorerSpec) -> Result<Arc<dyn Scorer>> {
        let factory = self
            .factories
            .get(&spec.key)
            .ok_or_else(|| EvalLoopError::NotFound(format!("scorer '{}'", spec.key)))?;
        Ok(factory(spec))
    }

    /// Build a scorer by key with default options.
    pub fn create_by_key(&self, key: &str) -> Result<Arc<dyn Scorer>> {
        self.create(&ScorerSpec::new(key))
    }
}
