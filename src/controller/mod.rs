//! Iteration controller: runs a task until a stop condition fires.

mod iteration;
mod state;
mod task;
mod validator;

pub use iteration::{ControllerOutcome, ControllerStatus, IterationController, IterationRecord};
pub use state::LoopState;
pub use task::{Task, TaskExecutor, TaskResponse};
pub use validator::IterationValidator;
