//! Error types used by the taskbase runtime and tasks.
//!
//! This module defines two main error enums:
//!
//! - [`RuntimeError`] — errors raised by the process-wide runtime itself
//!   (reload/retire batches, configuration, logging setup).
//! - [`TaskError`] — errors raised by an individual task or its behavior.
//!
//! Both types provide [`as_label`](TaskError::as_label) for logs/events.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// # Errors produced by the process-wide runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// A reload/retire batch did not finish inside the shared timeout.
    ///
    /// This is reported to [`ProcessControl::abort`](crate::ProcessControl::abort) first;
    /// the value is only observable when the abort hook returns (tests).
    #[error("{batch} batch hung after {timeout:?}; pending: {pending:?}")]
    BatchHung {
        /// Which batch hung (`"reload"` or `"retire"`).
        batch: &'static str,
        /// The configured batch timeout.
        timeout: Duration,
        /// Keys of the callbacks that had not completed.
        pending: Vec<String>,
    },

    /// Configuration file could not be read or parsed.
    #[error("config {path:?}: {error}")]
    Config {
        /// Path of the offending file.
        path: PathBuf,
        /// Underlying reader/parser message.
        error: String,
    },

    /// Logging could not be installed or adjusted.
    #[error("logging: {error}")]
    Logging {
        /// Underlying message.
        error: String,
    },

    /// Relaunching the current executable failed.
    #[error("relaunch failed: {0}")]
    Relaunch(#[source] std::io::Error),
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/events.
    ///
    /// # Example
    /// ```
    /// use taskbase::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::BatchHung { batch: "reload", timeout: Duration::from_secs(10), pending: vec![] };
    /// assert_eq!(err.as_label(), "runtime_batch_hung");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::BatchHung { .. } => "runtime_batch_hung",
            RuntimeError::Config { .. } => "runtime_config",
            RuntimeError::Logging { .. } => "runtime_logging",
            RuntimeError::Relaunch(_) => "runtime_relaunch",
        }
    }
}

/// # Errors produced by tasks and their behaviors.
///
/// Behaviors return [`TaskError::Fail`] (usually via [`TaskError::fail`]) for their own
/// failures; the other variants are produced by the runtime around them.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum TaskError {
    /// Behavior reported a failure.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Behavior failed to (re)apply its configuration.
    #[error("reload of {task} failed: {error}")]
    Reload {
        /// Task key.
        task: String,
        /// The underlying error message.
        error: String,
    },

    /// TCP listener could not be bound.
    #[error("bind {addr} failed: {source}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Filesystem watcher could not be created or attached.
    #[error("watch {path:?} failed: {error}")]
    Watch {
        /// Path that was requested.
        path: PathBuf,
        /// Underlying watcher message.
        error: String,
    },

    /// Operation on a task whose lifetime is already over.
    #[error("task {task} has already died")]
    Dead {
        /// Task key.
        task: String,
    },

    /// Task did not retire within its stop bound.
    #[error("stop of {task} timed out after {timeout:?}")]
    StopTimeout {
        /// Task key.
        task: String,
        /// The stop bound that was exceeded.
        timeout: Duration,
    },

    /// A bounded schedule (interval tasks) overran its period.
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// The bound that was exceeded.
        timeout: Duration,
    },

    /// Work was abandoned because the task's lifetime ended.
    #[error("context cancelled")]
    Canceled,
}

impl TaskError {
    /// Convenience constructor for behavior failures.
    ///
    /// ```
    /// use taskbase::TaskError;
    ///
    /// let err = TaskError::fail("connection refused");
    /// assert_eq!(err.to_string(), "execution failed: connection refused");
    /// ```
    pub fn fail(error: impl ToString) -> Self {
        TaskError::Fail {
            error: error.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/events.
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Fail { .. } => "task_failed",
            TaskError::Reload { .. } => "task_reload",
            TaskError::Bind { .. } => "task_bind",
            TaskError::Watch { .. } => "task_watch",
            TaskError::Dead { .. } => "task_dead",
            TaskError::StopTimeout { .. } => "task_stop_timeout",
            TaskError::Timeout { .. } => "task_timeout",
            TaskError::Canceled => "task_canceled",
        }
    }

    /// Indicates that the error only reflects the task being shut down.
    pub fn is_canceled(&self) -> bool {
        matches!(self, TaskError::Canceled)
    }
}
