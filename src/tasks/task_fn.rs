//! # Function-backed behavior (`TaskFn`)
//!
//! [`TaskFn`] wraps a closure `F: Fn(TaskContext, Option<A>) -> Fut`, producing a fresh
//! future per `schedule`. `reload` and `retire` are no-ops.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use taskbase::{Runtime, Config, Task, TaskContext, TaskError, TaskFn, TaskOptions};
//!
//! # async fn demo() -> Result<(), TaskError> {
//! let rt = Runtime::builder(Config::default()).build();
//! let tick = TaskFn::new(|_ctx: TaskContext, _arg: Option<()>| async move {
//!     println!("tick");
//!     Ok::<_, TaskError>(())
//! });
//! let task = Task::on_interval(&rt, tick, Duration::from_secs(1), TaskOptions::named("tick")).await?;
//! task.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;

use crate::error::TaskError;
use crate::tasks::tasker::{TaskContext, Tasker};

/// Closure-backed [`Tasker`].
pub struct TaskFn<A, F> {
    f: F,
    _arg: PhantomData<fn(A)>,
}

impl<A, F> TaskFn<A, F> {
    /// Wraps `f` as a behavior whose `schedule` calls it.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _arg: PhantomData,
        }
    }
}

#[async_trait]
impl<A, F, Fut> Tasker for TaskFn<A, F>
where
    A: Send + 'static,
    F: Fn(TaskContext, Option<A>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    type Arg = A;

    async fn schedule(&self, ctx: &TaskContext, arg: Option<A>) -> Result<(), TaskError> {
        (self.f)(ctx.clone(), arg).await
    }
}
