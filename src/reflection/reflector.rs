//! Reflector trait.

use async_trait::async_trait;

use super::types::{ReflectionInput, ReflectionResult, ReflectionType};
use crate::error::Result;

/// Default priority for reflectors that do not override it.
pub const DEFAULT_REFLECTOR_PRIORITY: i32 = 100;

/// Post-iteration analysis producing findings and suggestions.
///
/// Lower priority runs first. A failing reflector only loses its own
/// contribution; the coordinator keeps going.
#[async_trait]
pub trait Reflector: Send + Sync {
    fn name(&self) -> &str;

    fn priority(&self) -> i32 {
        DEFAULT_REFLECTOR_PRIORITY
    }

    fn reflection_type(&self) -> ReflectionType;

    async fn reflect(&self, input: &ReflectionInput) -> Result<ReflectionResult>;
}
