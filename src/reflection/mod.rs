//! Post-iteration reflection.
//!
//! Reflectors analyse an iteration's outcome; the coordinator picks which of
//! them run, isolates their failures and keeps a bounded history. Suggestions
//! flow into the next iteration's task context.

mod coordinator;
mod feedback;
mod history;
mod reflector;
mod types;

pub use coordinator::ReflectionCoordinator;
pub use feedback::{FailureCategory, FailureDetail, FeedbackFormatter, FeedbackReflector, classify};
pub use history::ReflectionHistory;
pub use reflector::{DEFAULT_REFLECTOR_PRIORITY, Reflector};
pub use types::{ReflectionInput, ReflectionResult, ReflectionType, ValidationOutcome};
