//! # Liveness registry and watchdog.
//!
//! Tracks named deadlines. Interval tasks re-register themselves on every cycle
//! (timeout = 4 × period), so a key only expires when its owner stopped cycling.
//!
//! ## Architecture
//! ```text
//! interval loop ──► Liveness::register(key, 4×period)   (every cycle)
//! Task::stop    ──► Liveness::cancel(key)
//!
//! Watchdog (interval task, not tracked itself)
//!   └─► every cycle: Liveness::expired(now)
//!         ├─ none    → touch alive file
//!         └─ some    → log every offender, publish LivenessExpired, abort
//! ```
//!
//! ## Rules
//! - `register`/`cancel` are the only mutation points; safe from any thread
//! - re-registering a key resets its last-touch time
//! - an expired key is fatal for the whole process (no retry)

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::core::runtime::Runtime;
use crate::error::TaskError;
use crate::events::{Event, EventKind};
use crate::tasks::{TaskContext, Tasker};

/// Deadline of one key.
#[derive(Debug, Clone, Copy)]
struct Live {
    last: Instant,
    timeout: Duration,
}

/// A key whose deadline passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expired {
    /// Registered key.
    pub key: String,
    /// Time since the last touch.
    pub elapsed: Duration,
    /// Registered timeout.
    pub timeout: Duration,
}

/// Thread-safe registry of named deadlines.
#[derive(Debug, Default)]
pub struct Liveness {
    entries: Mutex<HashMap<String, Live>>,
}

impl Liveness {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `key` (or refreshes it) with a deadline of `timeout` from now.
    pub fn register(&self, key: impl Into<String>, timeout: Duration) {
        let key = key.into();
        let fresh = self
            .entries
            .lock()
            .insert(
                key.clone(),
                Live {
                    last: Instant::now(),
                    timeout,
                },
            )
            .is_none();
        if fresh {
            tracing::debug!(key = %key, ?timeout, "liver register a new key");
        }
    }

    /// Removes `key`; returns whether it was registered.
    pub fn cancel(&self, key: &str) -> bool {
        let found = self.discard(key);
        if !found {
            tracing::warn!(key, "liver cancel a key that does not exist");
        }
        found
    }

    /// Removes `key` without complaining when it is absent.
    pub(crate) fn discard(&self, key: &str) -> bool {
        let found = self.entries.lock().remove(key).is_some();
        if found {
            tracing::debug!(key, "liver cancel a key");
        }
        found
    }

    /// Whether `key` is currently registered.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    /// Number of registered keys.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True if no key is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Keys whose time since last touch exceeds their timeout, sorted by key.
    pub fn expired(&self, now: Instant) -> Vec<Expired> {
        let entries = self.entries.lock();
        let mut out: Vec<Expired> = entries
            .iter()
            .filter_map(|(key, live)| {
                let elapsed = now.saturating_duration_since(live.last);
                (elapsed > live.timeout).then(|| Expired {
                    key: key.clone(),
                    elapsed,
                    timeout: live.timeout,
                })
            })
            .collect();
        out.sort_unstable_by(|a, b| a.key.cmp(&b.key));
        out
    }
}

/// Behavior of the watchdog task.
pub struct Watchdog {
    runtime: Runtime,
}

impl Watchdog {
    /// Creates the watchdog behavior for `runtime`'s registry.
    pub fn new(runtime: Runtime) -> Self {
        Self { runtime }
    }

    fn touch(path: &Path) {
        let res = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|file| file.set_modified(std::time::SystemTime::now()));
        if let Err(e) = res {
            tracing::error!(path = %path.display(), error = %e, "liver can't touch alive file");
        }
    }
}

#[async_trait]
impl Tasker for Watchdog {
    type Arg = ();

    async fn schedule(&self, _ctx: &TaskContext, _arg: Option<()>) -> Result<(), TaskError> {
        tracing::trace!("liver is working");

        let expired = self.runtime.liveness().expired(Instant::now());
        if !expired.is_empty() {
            for e in &expired {
                tracing::error!(
                    key = %e.key,
                    elapsed = ?e.elapsed,
                    timeout = ?e.timeout,
                    "a live context was died"
                );
                self.runtime.bus().publish(
                    Event::new(EventKind::LivenessExpired)
                        .with_task(e.key.as_str())
                        .with_timeout(e.timeout),
                );
            }
            let keys: Vec<&str> = expired.iter().map(|e| e.key.as_str()).collect();
            self.runtime
                .abort(&format!("liveness expired: {}", keys.join(", ")));
            return Ok(());
        }

        if let Some(path) = &self.runtime.config().liveness.alive_file {
            Self::touch(&self.runtime.path(path));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn key_expires_after_timeout() {
        let liveness = Liveness::new();
        liveness.register("k", Duration::from_millis(100));

        tokio::time::advance(Duration::from_millis(50)).await;
        assert!(liveness.expired(Instant::now()).is_empty());

        tokio::time::advance(Duration::from_millis(60)).await;
        let expired = liveness.expired(Instant::now());
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].key, "k");
        assert_eq!(expired[0].timeout, Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_expiry() {
        let liveness = Liveness::new();
        liveness.register("k", Duration::from_millis(100));
        assert!(liveness.cancel("k"));
        assert!(!liveness.cancel("k"));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(liveness.expired(Instant::now()).is_empty());
        assert!(liveness.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn reregister_refreshes_deadline() {
        let liveness = Liveness::new();
        liveness.register("k", Duration::from_millis(100));
        tokio::time::advance(Duration::from_millis(80)).await;
        liveness.register("k", Duration::from_millis(100));
        tokio::time::advance(Duration::from_millis(80)).await;

        assert!(liveness.expired(Instant::now()).is_empty());
        assert_eq!(liveness.len(), 1);
    }

    #[test]
    fn concurrent_register_and_cancel() {
        let liveness = std::sync::Arc::new(Liveness::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let l = liveness.clone();
                std::thread::spawn(move || {
                    for n in 0..100 {
                        let key = format!("{i}/{n}");
                        l.register(key.clone(), Duration::from_secs(1));
                        if n % 2 == 0 {
                            l.cancel(&key);
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(liveness.len(), 8 * 50);
    }
}
