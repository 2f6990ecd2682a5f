//! # Task abstractions.
//!
//! This module provides the behavior-side types:
//! - [`Tasker`] - trait every task behavior implements (`schedule` / `reload` / `retire`)
//! - [`TaskContext`] - token + shared state handed to each behavior call
//! - [`TaskBase`] - shared per-task state (identity, name, span, flags)
//! - [`TaskKind`] - trigger-type tag
//! - [`TaskOptions`] - optional construction overrides
//! - [`TaskFn`] - closure-backed behavior for simple tasks

mod base;
mod options;
mod task_fn;
mod tasker;

pub use base::{TaskBase, TaskKind};
pub use options::TaskOptions;
pub use task_fn::TaskFn;
pub use tasker::{TaskContext, Tasker};
