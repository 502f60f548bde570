//! evalloop - evaluation and iteration control for agent tasks
//!
//! evalloop scores datasets under a bounded concurrency ceiling, and drives a
//! task through execute/validate/reflect iterations until a composite stop
//! condition fires.

pub mod config;
pub mod controller;
pub mod error;
pub mod eval;
pub mod id;
pub mod reflection;
pub mod stop;
pub mod storage;

pub use error::{EvalLoopError, Result};
