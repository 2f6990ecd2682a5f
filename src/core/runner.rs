//! # Run a single `schedule` call.
//!
//! Executes one trigger cycle of a [`Tasker`] with an optional bound, logs and publishes
//! failures.
//!
//! ## Flow
//! ```text
//! Unbounded:
//!   schedule(ctx{life}) → Ok / Err
//!
//! Bounded (interval tasks, bound = period):
//!   child = life.child_token()
//!   timeout(bound, schedule(ctx{child}))
//!     ├─ finished → Ok / Err
//!     └─ elapsed  → child.cancel() → Err(Timeout)
//!
//! Err(Canceled) → graceful, not reported
//! other Err     → warn! + ScheduleFailed
//! ```
//!
//! ## Rules
//! - A bounded call never outlives its period: the future is dropped on expiry.
//! - Child cancellation does **not** affect the task's lifetime.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::error::TaskError;
use crate::events::{Bus, Event, EventKind};
use crate::tasks::{TaskBase, TaskContext, Tasker};

/// Runs `behavior.schedule` once against `life` (or a child of it bounded by `bound`).
pub(crate) async fn run_once<B: Tasker + ?Sized>(
    behavior: &B,
    base: &Arc<TaskBase>,
    life: &CancellationToken,
    arg: Option<B::Arg>,
    bound: Option<Duration>,
    bus: &Bus,
) -> Result<(), TaskError> {
    tracing::trace!(parent: base.span(), "task fire");

    let res = match bound.filter(|d| *d > Duration::ZERO) {
        Some(dur) => {
            let child = life.child_token();
            let ctx = TaskContext::new(child.clone(), Arc::clone(base));
            let fut = behavior.schedule(&ctx, arg).instrument(base.span().clone());
            let res = match time::timeout(dur, fut).await {
                Ok(res) => res,
                Err(_elapsed) => Err(TaskError::Timeout { timeout: dur }),
            };
            child.cancel();
            res
        }
        None => {
            let ctx = TaskContext::new(life.clone(), Arc::clone(base));
            behavior
                .schedule(&ctx, arg)
                .instrument(base.span().clone())
                .await
        }
    };

    match res {
        Err(TaskError::Canceled) => Ok(()),
        Err(e) => {
            tracing::warn!(parent: base.span(), error = %e, "task schedule failed");
            bus.publish(
                Event::new(EventKind::ScheduleFailed)
                    .with_task(base.key())
                    .with_reason(e.to_string()),
            );
            Err(e)
        }
        Ok(()) => Ok(()),
    }
}
