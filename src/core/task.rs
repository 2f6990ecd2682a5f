//! # Task handle and loop.
//!
//! [`Task`] owns one behavior, its [`TaskBase`] and the three lifecycle primitives:
//! - `life`: whole-lifetime token; cancelling it means "stop"
//! - `nap`: wake primitive of the current trigger wait (fire/reload/set_sleep)
//! - `retired`: satisfied once `retire` has completed
//!
//! ## Construction
//! ```text
//! Task::on_*(runtime, behavior, resource, opts)
//!   ├─► reload(ctx{life})                       error → abort process, Err
//!   ├─► trigger.acquire()                       error → retire, TaskStartFailed, Err
//!   └─► by setup:
//!         Once    → schedule → retire → Ok/Err
//!         Manual  → [schedule if immediately] → register callbacks
//!         Loop    → [schedule if immediately && !sleep]
//!                   → register callbacks → spawn routine → TaskStarted
//! ```
//!
//! ## Routine
//! ```text
//! loop {
//!   interval && tracked: sleeping ? liver_cancel : liver_register(4 × period)
//!   source.wait(life, nap)
//!     ├─ Fire(arg) → schedule(arg)           (interval: skipped while sleeping,
//!     │                                       bounded by the period otherwise)
//!     ├─ Closed    → life.cancel(), break    (channel closed)
//!     └─ Died      → break
//! }
//! deregister → drop trigger resource → retire(fresh ctx) → retired
//! ```
//!
//! ## Rules
//! - exactly one routine per task; it owns the trigger resource
//! - `retire` runs exactly once per task
//! - `stop` is idempotent and bounded by `Config::stop_timeout`
//! - `reload` is serialized per task

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::{Mutex, Notify, mpsc};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::core::orchestrator::callback;
use crate::core::runner::run_once;
use crate::core::runtime::Runtime;
use crate::core::trigger::{Setup, Source, Trigger, Wake, wakes_on_nap};
use crate::error::TaskError;
use crate::events::{Event, EventKind};
use crate::tasks::{TaskBase, TaskContext, TaskKind, TaskOptions, Tasker};

/// Heartbeat deadline of a tracked interval task, in periods.
const LIVENESS_PERIODS: u32 = 4;

/// Handle to a running task.
///
/// Cloning the handle is cheap; all clones control the same task.
pub struct Task<B: Tasker> {
    inner: Arc<Inner<B>>,
}

impl<B: Tasker> Clone for Task<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<B: Tasker> {
    behavior: B,
    base: Arc<TaskBase>,
    runtime: Runtime,

    life: CancellationToken,
    nap: Notify,
    retired: CancellationToken,

    retire_once: AtomicBool,
    stopped: AtomicBool,
    looping: AtomicBool,
    tracked: bool,

    reload_lock: Mutex<()>,
}

impl<B: Tasker<Arg = ()>> Task<B> {
    /// Runs `schedule` once, then ends.
    ///
    /// Returns the error of that single `schedule` call, if any.
    pub async fn one_time(runtime: &Runtime, behavior: B, opts: TaskOptions) -> Result<Self, TaskError> {
        Self::spawn(runtime, behavior, Trigger::OneTime, opts).await
    }

    /// Runs `schedule` only on [`fire`](Task::fire) (and once at start if `immediately`).
    pub async fn manual(runtime: &Runtime, behavior: B, opts: TaskOptions) -> Result<Self, TaskError> {
        Self::spawn(runtime, behavior, Trigger::Manual, opts).await
    }

    /// Runs `schedule` after every successful reload and on every fire.
    pub async fn on_reload(runtime: &Runtime, behavior: B, opts: TaskOptions) -> Result<Self, TaskError> {
        Self::spawn(runtime, behavior, Trigger::OnReload, opts).await
    }

    /// Runs `schedule` every `period`, each call bounded by `period`.
    ///
    /// Unless disabled with [`TaskOptions::with_liveness`], the task heartbeats into the
    /// liveness registry with a deadline of four periods.
    pub async fn on_interval(
        runtime: &Runtime,
        behavior: B,
        period: Duration,
        opts: TaskOptions,
    ) -> Result<Self, TaskError> {
        let period = period.max(Duration::from_millis(1));
        Self::spawn(runtime, behavior, Trigger::Interval(period), opts).await
    }
}

impl<B: Tasker> Task<B> {
    /// Runs `schedule` per value received on `rx`; the task ends when the channel closes.
    pub async fn on_channel(
        runtime: &Runtime,
        behavior: B,
        rx: mpsc::Receiver<B::Arg>,
        opts: TaskOptions,
    ) -> Result<Self, TaskError> {
        Self::spawn(runtime, behavior, Trigger::Channel(rx), opts).await
    }
}

impl<B: Tasker<Arg = TcpStream>> Task<B> {
    /// Binds `addr` and runs `schedule` per accepted connection.
    ///
    /// Port `0` is allowed; see [`local_addr`](Task::local_addr).
    pub async fn on_tcp(
        runtime: &Runtime,
        behavior: B,
        addr: impl Into<String>,
        opts: TaskOptions,
    ) -> Result<Self, TaskError> {
        let trigger = Trigger::Tcp {
            addr: addr.into(),
            wrap: |stream| stream,
        };
        Self::spawn(runtime, behavior, trigger, opts).await
    }
}

#[cfg(feature = "fs-watch")]
impl<B: Tasker<Arg = notify::Event>> Task<B> {
    /// Watches `path` (non-recursively) and runs `schedule` per filesystem event.
    pub async fn on_fs_change(
        runtime: &Runtime,
        behavior: B,
        path: impl Into<std::path::PathBuf>,
        opts: TaskOptions,
    ) -> Result<Self, TaskError> {
        let trigger = Trigger::FsWatch {
            path: path.into(),
            wrap: |event| event,
        };
        Self::spawn(runtime, behavior, trigger, opts).await
    }
}

impl<B: Tasker> Task<B> {
    async fn spawn(
        runtime: &Runtime,
        behavior: B,
        trigger: Trigger<B::Arg>,
        opts: TaskOptions,
    ) -> Result<Self, TaskError> {
        let kind = trigger.kind();
        let base = Arc::new(TaskBase::new(kind, &opts));
        let tracked = kind == TaskKind::OnInterval && opts.liveness.unwrap_or(true);

        let task = Self {
            inner: Arc::new(Inner {
                behavior,
                base,
                runtime: runtime.clone(),
                life: CancellationToken::new(),
                nap: Notify::new(),
                retired: CancellationToken::new(),
                retire_once: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                looping: AtomicBool::new(false),
                tracked,
                reload_lock: Mutex::new(()),
            }),
        };

        task.configure().await?;
        task.start(trigger).await?;
        Ok(task)
    }

    /// First reload; a task that cannot configure itself must not run.
    async fn configure(&self) -> Result<(), TaskError> {
        let inner = &self.inner;
        let res = {
            let _guard = inner.reload_lock.lock().await;
            let ctx = inner.context();
            inner
                .behavior
                .reload(&ctx)
                .instrument(inner.base.span().clone())
                .await
        };

        if let Err(e) = res {
            let key = inner.base.key().to_string();
            tracing::error!(parent: inner.base.span(), error = %e, "task initial reload failed");
            inner.life.cancel();
            inner.runtime.bus().publish(
                Event::new(EventKind::TaskReloadFailed)
                    .with_task(key.as_str())
                    .with_reason(e.to_string()),
            );
            inner
                .runtime
                .abort(&format!("initial reload of {key} failed: {e}"));
            return Err(TaskError::Reload {
                task: key,
                error: e.to_string(),
            });
        }
        Ok(())
    }

    async fn start(&self, trigger: Trigger<B::Arg>) -> Result<(), TaskError> {
        let inner = &self.inner;
        let base = &inner.base;

        let setup = match trigger.acquire(base).await {
            Ok(setup) => setup,
            Err(e) => {
                tracing::error!(parent: base.span(), error = %e, "task start failed");
                inner.life.cancel();
                inner.runtime.bus().publish(
                    Event::new(EventKind::TaskStartFailed)
                        .with_task(base.key())
                        .with_reason(e.to_string()),
                );
                inner.finish().await;
                return Err(e);
            }
        };

        match setup {
            Setup::Once => {
                let res = inner.run(None, None).await;
                inner.life.cancel();
                inner.finish().await;
                inner.publish_started();
                res
            }
            Setup::Manual => {
                if base.immediately() {
                    if let Err(e) = inner.run(None, None).await {
                        let _ = self.stop().await;
                        return Err(e);
                    }
                }
                self.register();
                inner.publish_started();
                Ok(())
            }
            Setup::Loop(source) => {
                if base.immediately() && !base.is_sleeping() {
                    let _ = inner.run(None, source.period()).await;
                }
                inner.looping.store(true, Ordering::Release);
                self.register();
                tokio::spawn(Arc::clone(inner).routine(source));
                inner.publish_started();
                Ok(())
            }
        }
    }

    /// Registers this task's reload/retire pair with the orchestrator.
    fn register(&self) {
        let orchestrator = self.inner.runtime.orchestrator();
        let key = self.inner.base.key();

        let task = self.clone();
        orchestrator.register_reload(
            key,
            callback(move || {
                let task = task.clone();
                async move { task.reload().await }
            }),
        );

        let task = self.clone();
        orchestrator.register_retire(
            key,
            callback(move || {
                let task = task.clone();
                async move { task.stop().await }
            }),
        );
    }

    /// Wakes the current trigger wait early.
    ///
    /// Manual tasks run `schedule` right here and return its result instead. Channel,
    /// TCP and filesystem tasks only run on a delivered value, so firing them does nothing.
    pub async fn fire(&self) -> Result<(), TaskError> {
        let inner = &self.inner;
        if self.died() {
            return Err(TaskError::Dead {
                task: inner.base.key().to_string(),
            });
        }
        if inner.base.kind() == TaskKind::Manual {
            return inner.run(None, None).await;
        }
        if inner.wakes_on_nap() {
            tracing::trace!(parent: inner.base.span(), "task nap woken");
            inner.nap.notify_one();
        }
        Ok(())
    }

    /// Re-applies configuration, then wakes the current trigger wait of on-reload and
    /// interval tasks.
    ///
    /// On error the task keeps its previous configuration and keeps running.
    pub async fn reload(&self) -> Result<(), TaskError> {
        let inner = &self.inner;
        let base = &inner.base;
        if self.died() {
            return Err(TaskError::Dead {
                task: base.key().to_string(),
            });
        }

        let _guard = inner.reload_lock.lock().await;
        let ctx = inner.context();
        match inner.behavior.reload(&ctx).instrument(base.span().clone()).await {
            Ok(()) => {
                if inner.wakes_on_nap() {
                    inner.nap.notify_one();
                }
                tracing::debug!(parent: base.span(), "task reloaded");
                inner
                    .runtime
                    .bus()
                    .publish(Event::new(EventKind::TaskReloaded).with_task(base.key()));
                Ok(())
            }
            Err(e) => {
                tracing::warn!(parent: base.span(), error = %e, "task reload failed, keeping previous configuration");
                inner.runtime.bus().publish(
                    Event::new(EventKind::TaskReloadFailed)
                        .with_task(base.key())
                        .with_reason(e.to_string()),
                );
                Err(TaskError::Reload {
                    task: base.key().to_string(),
                    error: e.to_string(),
                })
            }
        }
    }

    /// Stops the task and waits (bounded) until it has retired.
    ///
    /// Idempotent: later calls return `Ok` without running `retire` again.
    pub async fn stop(&self) -> Result<(), TaskError> {
        let inner = &self.inner;
        let base = &inner.base;
        if inner.stopped.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        inner.runtime.orchestrator().deregister(base.key());
        inner.life.cancel();
        if inner.tracked {
            inner.runtime.liveness().discard(base.key());
        }

        let timeout = inner.runtime.config().stop_timeout();
        let wait = async {
            if !inner.looping.load(Ordering::Acquire) {
                inner.finish().await;
            }
            inner.retired.cancelled().await;
        };

        match time::timeout(timeout, wait).await {
            Ok(()) => {
                tracing::debug!(parent: base.span(), "task stopped");
                Ok(())
            }
            Err(_elapsed) => {
                tracing::warn!(parent: base.span(), ?timeout, "task stop timed out");
                inner.runtime.bus().publish(
                    Event::new(EventKind::TaskStopTimeout)
                        .with_task(base.key())
                        .with_timeout(timeout),
                );
                Err(TaskError::StopTimeout {
                    task: base.key().to_string(),
                    timeout,
                })
            }
        }
    }

    /// Suspends or resumes periodic firing and wakes the loop to apply it.
    pub fn set_sleep(&self, sleep: bool) {
        self.inner.base.set_sleep(sleep);
        if self.inner.wakes_on_nap() {
            self.inner.nap.notify_one();
        }
    }

    /// Whether the task's lifetime is over.
    pub fn died(&self) -> bool {
        self.inner.life.is_cancelled()
    }

    /// Whether `retire` has completed.
    pub fn retired(&self) -> bool {
        self.inner.retired.is_cancelled()
    }

    /// Shared task state.
    pub fn base(&self) -> &TaskBase {
        &self.inner.base
    }

    /// The task's behavior.
    pub fn behavior(&self) -> &B {
        &self.inner.behavior
    }

    pub fn id(&self) -> &str {
        self.inner.base.id()
    }

    pub fn name(&self) -> &str {
        self.inner.base.name()
    }

    /// Registration key (`name/id`).
    pub fn key(&self) -> &str {
        self.inner.base.key()
    }

    pub fn kind(&self) -> TaskKind {
        self.inner.base.kind()
    }

    /// Bound address of a TCP task.
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.inner.base.local_addr()
    }
}

impl<B: Tasker> Inner<B> {
    /// Looping on-reload and interval tasks; the only ones a nap wake reaches.
    fn wakes_on_nap(&self) -> bool {
        self.looping.load(Ordering::Acquire) && wakes_on_nap(self.base.kind())
    }

    fn context(&self) -> TaskContext {
        TaskContext::new(self.life.clone(), Arc::clone(&self.base))
    }

    async fn run(&self, arg: Option<B::Arg>, bound: Option<Duration>) -> Result<(), TaskError> {
        run_once(
            &self.behavior,
            &self.base,
            &self.life,
            arg,
            bound,
            self.runtime.bus(),
        )
        .await
    }

    fn publish_started(&self) {
        tracing::debug!(parent: self.base.span(), kind = %self.base.kind(), "task started");
        self.runtime.bus().publish(
            Event::new(EventKind::TaskStarted)
                .with_task(self.base.key())
                .with_reason(self.base.kind().as_str()),
        );
    }

    async fn routine(self: Arc<Self>, mut source: Source<B::Arg>) {
        let key = self.base.key();
        let period = source.period();
        tracing::trace!(parent: self.base.span(), "task routine started");

        loop {
            if let (true, Some(period)) = (self.tracked, period) {
                if self.base.is_sleeping() {
                    self.runtime.liveness().discard(key);
                } else {
                    self.runtime
                        .liveness()
                        .register(key, period.saturating_mul(LIVENESS_PERIODS));
                }
            }

            match source.wait(&self.life, &self.nap, &self.base).await {
                Wake::Died => break,
                Wake::Closed => {
                    tracing::debug!(parent: self.base.span(), "task trigger closed");
                    self.life.cancel();
                    break;
                }
                Wake::Fire(arg) => {
                    if period.is_some() && self.base.is_sleeping() {
                        continue;
                    }
                    let _ = self.run(arg, period).await;
                }
            }
        }

        if self.tracked {
            self.runtime.liveness().discard(key);
        }
        self.runtime.orchestrator().deregister(key);
        drop(source);

        tracing::debug!(parent: self.base.span(), "task routine is stopping");
        self.finish().await;
    }

    /// Runs `retire` once, then satisfies `retired`.
    async fn finish(&self) {
        if self.retire_once.swap(true, Ordering::AcqRel) {
            return;
        }

        let ctx = TaskContext::new(CancellationToken::new(), Arc::clone(&self.base));
        if let Err(e) = self
            .behavior
            .retire(&ctx)
            .instrument(self.base.span().clone())
            .await
        {
            tracing::warn!(parent: self.base.span(), error = %e, "task retire failed");
        }

        self.runtime
            .bus()
            .publish(Event::new(EventKind::TaskRetired).with_task(self.base.key()));
        self.retired.cancel();
    }
}
