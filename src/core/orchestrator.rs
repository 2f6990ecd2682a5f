//! # Global reload/retire orchestrator.
//!
//! Holds the two process-wide callback registries and runs them as bounded
//! parallel batches.
//!
//! ## Architecture
//! ```text
//! Task::start ──► register(key, reload_cb, retire_cb)
//! Task::stop  ──► deregister(key)        (before the task cancels itself)
//!
//! Runtime::reload ─┐                      Runtime::retire ─┐
//!   reload_lock    │                        retire_lock    │
//!                  ▼                                       ▼
//!        group_run("reload", snapshot)          group_run("retire", snapshot)
//!             ├─► spawn cb #1 ─┐
//!             ├─► spawn cb #2 ─┼─► status[key] = done
//!             └─► spawn cb #N ─┘
//!             one shared timeout for the whole batch
//!               ├─ all done  → Ok
//!               └─ elapsed   → log every status → BatchHung (caller aborts)
//! ```
//!
//! ## Rules
//! - callback errors are logged and published, never fail the batch
//! - no lock is held while callbacks run (they may deregister themselves)
//! - reload sweeps never interleave with reload sweeps; same for retire

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::task::JoinSet;
use tokio::time;

use crate::error::{RuntimeError, TaskError};
use crate::events::{Bus, Event, EventKind};

/// Zero-argument fallible callback stored in the registries.
pub type Callback = Arc<dyn Fn() -> BoxFuture<'static, Result<(), TaskError>> + Send + Sync>;

/// Wraps an async closure as a [`Callback`].
pub fn callback<F, Fut>(f: F) -> Callback
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

/// Process-wide reload/retire registries.
#[derive(Default)]
pub struct Orchestrator {
    reloads: Mutex<HashMap<String, Callback>>,
    retires: Mutex<HashMap<String, Callback>>,
    pub(crate) reload_lock: tokio::sync::Mutex<()>,
    pub(crate) retire_lock: tokio::sync::Mutex<()>,
    reloaded_at: Mutex<Option<SystemTime>>,
}

impl Orchestrator {
    /// Creates empty registries.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the reload callback under `key`.
    pub fn register_reload(&self, key: impl Into<String>, cb: Callback) {
        self.reloads.lock().insert(key.into(), cb);
    }

    /// Removes the reload callback under `key`.
    pub fn cancel_reload(&self, key: &str) {
        self.reloads.lock().remove(key);
    }

    /// Registers (or replaces) the retire callback under `key`.
    pub fn register_retire(&self, key: impl Into<String>, cb: Callback) {
        self.retires.lock().insert(key.into(), cb);
    }

    /// Removes the retire callback under `key`.
    pub fn cancel_retire(&self, key: &str) {
        self.retires.lock().remove(key);
    }

    /// Removes both callbacks of `key`.
    pub fn deregister(&self, key: &str) {
        self.cancel_retire(key);
        self.cancel_reload(key);
    }

    /// Sorted keys currently holding a reload callback.
    pub fn reload_keys(&self) -> Vec<String> {
        sorted_keys(&self.reloads.lock())
    }

    /// Sorted keys currently holding a retire callback.
    pub fn retire_keys(&self) -> Vec<String> {
        sorted_keys(&self.retires.lock())
    }

    /// Time the last reload sweep completed.
    pub fn reloaded_at(&self) -> Option<SystemTime> {
        *self.reloaded_at.lock()
    }

    /// Runs every reload callback; caller holds `reload_lock`.
    pub(crate) async fn run_reloads(&self, timeout: Duration, bus: &Bus) -> Result<(), RuntimeError> {
        let callbacks = snapshot(&self.reloads.lock());
        group_run("reload", callbacks, timeout, bus).await?;
        *self.reloaded_at.lock() = Some(SystemTime::now());
        Ok(())
    }

    /// Runs every retire callback; caller holds `retire_lock`.
    pub(crate) async fn run_retires(&self, timeout: Duration, bus: &Bus) -> Result<(), RuntimeError> {
        let callbacks = snapshot(&self.retires.lock());
        group_run("retire", callbacks, timeout, bus).await
    }
}

fn sorted_keys(map: &HashMap<String, Callback>) -> Vec<String> {
    let mut keys: Vec<String> = map.keys().cloned().collect();
    keys.sort_unstable();
    keys
}

fn snapshot(map: &HashMap<String, Callback>) -> Vec<(String, Callback)> {
    map.iter().map(|(k, cb)| (k.clone(), Arc::clone(cb))).collect()
}

/// Runs `callbacks` concurrently under one shared `timeout`.
///
/// ### Failure semantics
/// - a callback error (or panic) is logged as a warning; siblings are unaffected
/// - an elapsed timeout logs the completion status of every callback and returns
///   [`RuntimeError::BatchHung`]; unfinished callbacks are aborted
pub(crate) async fn group_run(
    batch: &'static str,
    callbacks: Vec<(String, Callback)>,
    timeout: Duration,
    bus: &Bus,
) -> Result<(), RuntimeError> {
    let status: Arc<Mutex<BTreeMap<String, bool>>> = Arc::new(Mutex::new(BTreeMap::new()));
    let mut set = JoinSet::new();

    for (key, cb) in callbacks {
        status.lock().insert(key.clone(), false);
        let status = Arc::clone(&status);
        let bus = bus.clone();
        set.spawn(async move {
            if let Err(e) = cb().await {
                tracing::warn!(batch, key = %key, error = %e, "an error occurred while group run");
                bus.publish(
                    Event::new(EventKind::CallbackFailed)
                        .with_task(key.as_str())
                        .with_reason(e.to_string()),
                );
            }
            status.lock().insert(key, true);
        });
    }

    let done = async {
        while let Some(res) = set.join_next().await {
            if let Err(e) = res {
                tracing::warn!(batch, error = %e, "group run callback panicked");
            }
        }
    };

    if time::timeout(timeout, done).await.is_ok() {
        return Ok(());
    }

    let status = status.lock().clone();
    for (key, finished) in &status {
        tracing::error!(batch, key = %key, finished, "function statuses");
    }
    let pending: Vec<String> = status
        .into_iter()
        .filter_map(|(key, finished)| (!finished).then_some(key))
        .collect();
    tracing::error!(batch, ?timeout, ?pending, "group run was hang");

    bus.publish(
        Event::new(EventKind::BatchHung)
            .with_reason(format!("batch={batch} pending={pending:?}"))
            .with_timeout(timeout),
    );
    Err(RuntimeError::BatchHung {
        batch,
        timeout,
        pending,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(counter: &Arc<AtomicUsize>, fail: bool) -> Callback {
        let counter = Arc::clone(counter);
        callback(move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if fail {
                    Err(TaskError::fail("boom"))
                } else {
                    Ok(())
                }
            }
        })
    }

    #[tokio::test]
    async fn failing_callback_does_not_fail_batch() {
        let orch = Orchestrator::new();
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let counter = Arc::new(AtomicUsize::new(0));

        orch.register_reload("a", counting(&counter, false));
        orch.register_reload("b", counting(&counter, true));
        orch.register_reload("c", counting(&counter, false));

        orch.run_reloads(Duration::from_secs(1), &bus).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert!(orch.reloaded_at().is_some());

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::CallbackFailed);
        assert_eq!(ev.task.as_deref(), Some("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_callback_reports_pending() {
        let orch = Orchestrator::new();
        let bus = Bus::new(16);
        let counter = Arc::new(AtomicUsize::new(0));

        orch.register_retire("quick", counting(&counter, false));
        orch.register_retire(
            "stuck",
            callback(|| async {
                std::future::pending::<()>().await;
                Ok(())
            }),
        );

        let err = orch
            .run_retires(Duration::from_millis(100), &bus)
            .await
            .unwrap_err();
        match err {
            RuntimeError::BatchHung { batch, pending, .. } => {
                assert_eq!(batch, "retire");
                assert_eq!(pending, vec!["stuck".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn deregister_removes_both() {
        let orch = Orchestrator::new();
        let counter = Arc::new(AtomicUsize::new(0));
        orch.register_reload("k", counting(&counter, false));
        orch.register_retire("k", counting(&counter, false));
        orch.register_retire("other", counting(&counter, false));

        orch.deregister("k");
        assert!(orch.reload_keys().is_empty());
        assert_eq!(orch.retire_keys(), vec!["other".to_string()]);
    }
}
