//! Multi-agent coordination: subtasks in child sessions and handoffs.

pub mod task;

pub use task::{TaskContext, TaskEngine, TaskInput, TaskMode, TaskResult};
