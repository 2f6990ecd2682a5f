//! # Lifecycle events emitted by tasks and the runtime.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Task events**: one task's lifecycle (started, reloaded, retired, ...)
//! - **Batch events**: global reload/retire sweeps and their failures
//! - **Process events**: liveness expiry, relaunch, exit
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use taskbase::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::LivenessExpired)
//!     .with_task("ticker/42")
//!     .with_timeout(Duration::from_secs(4));
//!
//! assert_eq!(ev.kind, EventKind::LivenessExpired);
//! assert_eq!(ev.task.as_deref(), Some("ticker/42"));
//! assert_eq!(ev.timeout_ms, Some(4000));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Task events ===
    /// Task finished its start sequence and is live (or, for one-shot, done).
    ///
    /// Sets `task`, `reason` (trigger kind).
    TaskStarted,

    /// Task could not acquire its trigger resource; it is terminal.
    ///
    /// Sets `task`, `reason`.
    TaskStartFailed,

    /// A `schedule` call returned an error (the task keeps running).
    ///
    /// Sets `task`, `reason`.
    ScheduleFailed,

    /// Task re-applied its configuration.
    ///
    /// Sets `task`.
    TaskReloaded,

    /// Task failed to re-apply its configuration and keeps the previous one.
    ///
    /// Sets `task`, `reason`.
    TaskReloadFailed,

    /// Task ran `retire` and its loop is gone.
    ///
    /// Sets `task`.
    TaskRetired,

    /// `Task::stop` gave up waiting for the task to retire.
    ///
    /// Sets `task`, `timeout_ms`.
    TaskStopTimeout,

    // === Batch events ===
    /// Global reload sweep is starting.
    ReloadStarted,

    /// Global reload sweep finished within the batch timeout.
    ReloadFinished,

    /// Global retire sweep is starting.
    ///
    /// Sets `code`.
    RetireStarted,

    /// Global retire sweep finished within the batch timeout.
    ///
    /// Sets `code`.
    RetireFinished,

    /// One callback of a sweep returned an error (sweep continues).
    ///
    /// Sets `task` (callback key), `reason`.
    CallbackFailed,

    /// A sweep did not finish inside the batch timeout; the process is aborted.
    ///
    /// Sets `reason` (batch name and pending keys), `timeout_ms`.
    BatchHung,

    // === Process events ===
    /// A liveness key missed its deadline; the process is aborted.
    ///
    /// Sets `task` (liveness key), `timeout_ms`.
    LivenessExpired,

    /// A fresh copy of the process was spawned.
    Relaunched,

    /// The process is about to exit.
    ///
    /// Sets `code`.
    Exiting,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Task key (or liveness/callback key), if applicable.
    pub task: Option<Arc<str>>,
    /// Human-readable reason (errors, batch details, ...).
    pub reason: Option<Arc<str>>,
    /// Timeout involved, in milliseconds (compact).
    pub timeout_ms: Option<u32>,
    /// Exit code for retire/exit events.
    pub code: Option<i32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            task: None,
            reason: None,
            timeout_ms: None,
            code: None,
        }
    }

    /// Attaches a task key.
    #[inline]
    pub fn with_task(mut self, task: impl Into<Arc<str>>) -> Self {
        self.task = Some(task.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a timeout duration (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.timeout_ms = Some(ms);
        self
    }

    /// Attaches an exit code.
    #[inline]
    pub fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }

    /// True for events after which the runtime aborts the process.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind, EventKind::BatchHung | EventKind::LivenessExpired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_is_monotonic() {
        let a = Event::new(EventKind::ReloadStarted);
        let b = Event::new(EventKind::ReloadFinished);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn fatal_kinds() {
        assert!(Event::new(EventKind::BatchHung).is_fatal());
        assert!(Event::new(EventKind::LivenessExpired).is_fatal());
        assert!(!Event::new(EventKind::TaskStopTimeout).is_fatal());
    }
}
