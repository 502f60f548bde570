//! Reflection coordinator.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;

use super::feedback::{FeedbackFormatter, FeedbackReflector};
use super::history::ReflectionHistory;
use super::reflector::Reflector;
use super::types::{ReflectionInput, ReflectionResult, ReflectionType};
use crate::config::ReflectionConfig;

/// Runs registered reflectors after each iteration and keeps a bounded history.
pub struct ReflectionCoordinator {
    reflectors: Vec<Arc<dyn Reflector>>,
    history: ReflectionHistory,
    formatter: FeedbackFormatter,
}

impl ReflectionCoordinator {
    pub fn new(history_size: usize) -> Self {
        Self {
            reflectors: Vec::new(),
            history: ReflectionHistory::new(history_size),
            formatter: FeedbackFormatter::new(),
        }
    }

    /// Coordinator sized from config, with the built-in feedback reflector registered.
    pub fn from_config(config: &ReflectionConfig) -> Self {
        let mut coordinator = Self::new(config.history_size);
        coordinator.formatter = FeedbackFormatter::new().with_max_suggestions(config.max_suggestions);
        coordinator.with_reflector(FeedbackReflector::new())
    }

    pub fn with_reflector(mut self, reflector: impl Reflector + 'static) -> Self {
        self.add_reflector(Arc::new(reflector));
        self
    }

    pub fn with_formatter(mut self, formatter: FeedbackFormatter) -> Self {
        self.formatter = formatter;
        self
    }

    /// Register a reflector. Equal priorities keep insertion order.
    pub fn add_reflector(&mut self, reflector: Arc<dyn Reflector>) {
        self.reflectors.push(reflector);
        self.reflectors.sort_by_key(|r| r.priority());
    }

    pub fn remove_reflector(&mut self, name: &str) -> bool {
        let before = self.reflectors.len();
        self.reflectors.retain(|r| r.name() != name);
        self.reflectors.len() != before
    }

    pub fn reflector_names(&self) -> Vec<&str> {
        self.reflectors.iter().map(|r| r.name()).collect()
    }

    pub fn history(&self) -> &ReflectionHistory {
        &self.history
    }

    pub fn formatter(&self) -> &FeedbackFormatter {
        &self.formatter
    }

    /// Reflect on one iteration, selecting reflectors by its outcome.
    pub async fn reflect(&mut self, input: &ReflectionInput) -> Vec<ReflectionResult> {
        self.reflect_filtered(input, None).await
    }

    /// Reflect with an explicit set of reflection types.
    ///
    /// Without a filter, a failed iteration only runs failure and optimization
    /// reflectors. Reflector errors and panics are logged and skipped.
    pub async fn reflect_filtered(
        &mut self,
        input: &ReflectionInput,
        types: Option<&[ReflectionType]>,
    ) -> Vec<ReflectionResult> {
        let selected: Vec<Arc<dyn Reflector>> = self
            .reflectors
            .iter()
            .filter(|r| match types {
                Some(types) => types.contains(&r.reflection_type()),
                None => r.reflection_type().applies_to(input.success),
            })
            .cloned()
            .collect();

        log::debug!(
            "Reflecting on iteration {} with {} of {} reflectors",
            input.iteration,
            selected.len(),
            self.reflectors.len()
        );
        self.history.record_outcome(input.success);

        let mut results = Vec::with_capacity(selected.len());
        for reflector in selected {
            let outcome = AssertUnwindSafe(reflector.reflect(input)).catch_unwind().await;
            match outcome {
                Ok(Ok(result)) => {
                    tracing::debug!(
                        reflector = reflector.name(),
                        suggestions = result.suggestions.len(),
                        "Reflection complete"
                    );
                    self.history.push(result.clone());
                    results.push(result);
                }
                Ok(Err(e)) => {
                    log::warn!("Reflector '{}' failed: {}", reflector.name(), e);
                }
                Err(_) => {
                    log::warn!("Reflector '{}' panicked", reflector.name());
                }
            }
        }
        results
    }

    /// Deduplicated suggestions from `results`, capped by the formatter.
    pub fn suggestions(&self, results: &[ReflectionResult]) -> Vec<String> {
        self.formatter.suggestions(results)
    }

    /// Feedback block for the next task, or `None` when there is nothing to say.
    pub fn feedback(&self, iteration: u32, results: &[ReflectionResult]) -> Option<String> {
        let text = self.formatter.format(iteration, results);
        (!text.is_empty()).then_some(text)
    }
}

impl Default for ReflectionCoordinator {
    fn default() -> Self {
        Self::from_config(&ReflectionConfig::default())
    }
}
