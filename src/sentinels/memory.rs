//! # Memory sentinel.
//!
//! Interval task sampling the resident set size. Above the configured limit the
//! process relaunches itself: every task retires, a fresh copy starts, this one exits.
//!
//! The limit is re-read from the config on every reload (`0` = 1 GiB, floor 16 MiB).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;

use crate::core::{Runtime, Task};
use crate::error::TaskError;
use crate::tasks::{TaskContext, TaskOptions, Tasker};

/// Source of the resident set size in bytes.
pub type Probe = fn() -> Option<u64>;

/// Behavior of the memory sentinel task.
pub struct MemorySentinel {
    runtime: Runtime,
    probe: Probe,
    limit: AtomicU64,
    relaunching: AtomicBool,
}

impl MemorySentinel {
    /// Sentinel reading the process's own resident memory.
    pub fn new(runtime: Runtime) -> Self {
        Self::with_probe(runtime, resident_bytes)
    }

    /// Sentinel reading memory usage from `probe`.
    pub fn with_probe(runtime: Runtime, probe: Probe) -> Self {
        Self {
            runtime,
            probe,
            limit: AtomicU64::new(0),
            relaunching: AtomicBool::new(false),
        }
    }

    /// Starts the sentinel as an interval task on `memory.interval`.
    pub async fn start(runtime: &Runtime) -> Result<Task<Self>, TaskError> {
        let interval = runtime.config().memory.interval;
        Task::on_interval(
            runtime,
            Self::new(runtime.clone()),
            interval,
            TaskOptions::named("memory"),
        )
        .await
    }

    /// Limit currently in force, in bytes.
    pub fn limit(&self) -> u64 {
        self.limit.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Tasker for MemorySentinel {
    type Arg = ();

    async fn schedule(&self, _ctx: &TaskContext, _arg: Option<()>) -> Result<(), TaskError> {
        let Some(rss) = (self.probe)() else {
            return Ok(());
        };
        let limit = self.limit();
        tracing::trace!(rss, limit, "memory sampled");
        if rss <= limit || self.relaunching.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        tracing::warn!(rss, limit, "memory over limit, relaunching");
        let runtime = self.runtime.clone();
        tokio::spawn(async move {
            let _ = runtime.relaunch().await;
        });
        Ok(())
    }

    async fn reload(&self, _ctx: &TaskContext) -> Result<(), TaskError> {
        let limit = self.runtime.config().memory.effective_limit();
        self.limit.store(limit, Ordering::Release);
        tracing::debug!(limit, "memory limit applied");
        Ok(())
    }
}

/// Resident set size of the current process (Linux only).
pub fn resident_bytes() -> Option<u64> {
    if cfg!(target_os = "linux") {
        let status = std::fs::read_to_string("/proc/self/status").ok()?;
        parse_vm_rss(&status)
    } else {
        None
    }
}

fn parse_vm_rss(status: &str) -> Option<u64> {
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kb: u64 = line
        .trim_start_matches("VmRSS:")
        .split_whitespace()
        .next()?
        .parse()
        .ok()?;
    Some(kb * 1024)
}
