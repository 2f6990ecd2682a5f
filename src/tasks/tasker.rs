//! # Behavior contract.
//!
//! A [`Tasker`] is what a task *does*; the runtime decides *when*. Every task owns
//! exactly one behavior and calls it from a single loop:
//!
//! ```text
//! construction ──► reload()            (once, before the task is live)
//!      trigger ──► schedule(arg)       (per trigger event, never concurrently from the loop)
//! global reload ──► reload()           (serialized per task)
//!         stop ──► retire()            (exactly once, before the loop exits)
//! ```
//!
//! The argument type is fixed per trigger type by the construction entry point:
//! TCP tasks receive `TcpStream`s, channel tasks receive the channel item, fs-watch
//! tasks receive `notify::Event`s, everything else uses `()`.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::Span;

use crate::error::TaskError;
use crate::tasks::base::TaskBase;

/// # Task behavior.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use taskbase::{TaskContext, TaskError, Tasker};
///
/// struct Janitor;
///
/// #[async_trait]
/// impl Tasker for Janitor {
///     type Arg = ();
///
///     async fn schedule(&self, ctx: &TaskContext, _arg: Option<()>) -> Result<(), TaskError> {
///         if ctx.is_cancelled() {
///             return Err(TaskError::Canceled);
///         }
///         // sweep...
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Tasker: Send + Sync + 'static {
    /// Value delivered by the trigger to each `schedule` call.
    type Arg: Send + 'static;

    /// Does the unit of work for one trigger event.
    ///
    /// `arg` is `None` when the task was woken without a trigger value
    /// (`fire`, `reload`, timer expiry, immediate start).
    async fn schedule(&self, ctx: &TaskContext, arg: Option<Self::Arg>) -> Result<(), TaskError>;

    /// Applies (or re-applies) configuration.
    ///
    /// Called once at construction (an error there is fatal) and on every reload.
    async fn reload(&self, _ctx: &TaskContext) -> Result<(), TaskError> {
        Ok(())
    }

    /// Releases resources; called exactly once when the task ends.
    async fn retire(&self, _ctx: &TaskContext) -> Result<(), TaskError> {
        Ok(())
    }
}

/// Per-call context: the token to honour plus the task's shared state.
#[derive(Clone, Debug)]
pub struct TaskContext {
    token: CancellationToken,
    base: Arc<TaskBase>,
}

impl TaskContext {
    pub(crate) fn new(token: CancellationToken, base: Arc<TaskBase>) -> Self {
        Self { token, base }
    }

    /// Token cancelled when the work should stop (task stopped, period overrun).
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Shorthand for `token().is_cancelled()`.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes when the token is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Shared task state.
    pub fn base(&self) -> &TaskBase {
        &self.base
    }

    /// Task name.
    pub fn name(&self) -> &str {
        self.base.name()
    }

    /// Logging span of the task.
    pub fn span(&self) -> &Span {
        self.base.span()
    }
}
