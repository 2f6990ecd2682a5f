//! # Shared per-task state.
//!
//! [`TaskBase`] is created once per task and shared (by `Arc`) between the task's
//! loop, its handle and every [`TaskContext`](crate::TaskContext) the behavior sees.
//!
//! ## Rules
//! - identity, name, key, kind and span are fixed at construction
//! - `sleep` is the only flag that changes at runtime (interval tasks)
//! - `local_addr` is written once by the TCP setup

use std::fmt;
use std::net::SocketAddr;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::Span;
use uuid::Uuid;

use crate::tasks::options::TaskOptions;

/// Trigger-type tag of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Runs `schedule` once at start, then ends.
    OneTime,
    /// Runs `schedule` per accepted TCP connection.
    OnTcp,
    /// Runs `schedule` whenever the task is reloaded or fired.
    OnReload,
    /// Runs `schedule` per value received from a channel.
    OnChannel,
    /// Runs `schedule` every period.
    OnInterval,
    /// Runs `schedule` per filesystem event.
    OnFsChange,
    /// Runs `schedule` only when fired.
    Manual,
}

impl TaskKind {
    /// Stable snake_case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::OneTime => "one_time",
            TaskKind::OnTcp => "on_tcp",
            TaskKind::OnReload => "on_reload",
            TaskKind::OnChannel => "on_channel",
            TaskKind::OnInterval => "on_interval",
            TaskKind::OnFsChange => "on_fs_change",
            TaskKind::Manual => "manual",
        }
    }

    /// Whether `immediately` is on unless overridden.
    pub(crate) fn immediate_by_default(&self) -> bool {
        matches!(self, TaskKind::OnReload | TaskKind::OnInterval)
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared state of one task.
#[derive(Debug)]
pub struct TaskBase {
    id: String,
    name: String,
    key: String,
    kind: TaskKind,
    span: Span,
    immediately: bool,
    sleep: AtomicBool,
    local_addr: OnceLock<SocketAddr>,
}

impl TaskBase {
    pub(crate) fn new(kind: TaskKind, opts: &TaskOptions) -> Self {
        let id = Uuid::new_v4().to_string();
        let name = match &opts.name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!("anonymous/{id}"),
        };
        let span = match &opts.span {
            Some(span) => span.clone(),
            None => tracing::info_span!("task", task = %name, id = %id),
        };
        Self {
            key: format!("{name}/{id}"),
            immediately: opts.immediately.unwrap_or(kind.immediate_by_default()),
            sleep: AtomicBool::new(opts.sleep),
            local_addr: OnceLock::new(),
            id,
            name,
            kind,
            span,
        }
    }

    /// Generated identity.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Human name (`anonymous/<id>` when none was given).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `name/id`; the key under which the task is registered process-wide.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Trigger type.
    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    /// Logging span every behavior call runs in.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Whether `schedule` runs once at start without waiting for a trigger.
    pub fn immediately(&self) -> bool {
        self.immediately
    }

    /// Whether periodic firing is suspended (interval tasks).
    pub fn is_sleeping(&self) -> bool {
        self.sleep.load(Ordering::Acquire)
    }

    /// Suspends or resumes periodic firing; takes effect on the next loop iteration.
    ///
    /// Use [`Task::set_sleep`](crate::Task::set_sleep) from outside the behavior to
    /// also wake the loop right away.
    pub fn set_sleep(&self, sleep: bool) {
        self.sleep.store(sleep, Ordering::Release);
    }

    /// Address the TCP listener is bound to.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    pub(crate) fn set_local_addr(&self, addr: SocketAddr) {
        let _ = self.local_addr.set(addr);
    }
}
