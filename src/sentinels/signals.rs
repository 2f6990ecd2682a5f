//! # Signal sentinel.
//!
//! A channel-driven task fed by a small forwarder that listens for OS signals.
//!
//! ## Signals
//! **Unix platforms:**
//! - `SIGTERM`, `SIGINT` → global retire with code 0
//! - `SIGUSR1` → global reload
//! - `SIGUSR2` → ignored (registered so it no longer kills the process)
//!
//! **Other platforms:**
//! - `Ctrl-C` via [`tokio::signal::ctrl_c`] → global retire with code 0
//!
//! Global operations are spawned, never awaited from `schedule`: a global retire stops
//! this very task and would otherwise wait on itself.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::{Runtime, Task};
use crate::error::TaskError;
use crate::tasks::{TaskContext, TaskOptions, Tasker};

/// Signal delivered to the sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// `SIGTERM`.
    Terminate,
    /// `SIGINT` / Ctrl-C.
    Interrupt,
    /// `SIGUSR1`.
    Reload,
    /// `SIGUSR2`.
    User2,
}

/// Behavior of the signal sentinel task.
pub struct SignalSentinel {
    runtime: Runtime,
    forwarder: CancellationToken,
}

impl SignalSentinel {
    /// Creates the behavior; feed it through any `mpsc::Receiver<Signal>`.
    pub fn new(runtime: Runtime) -> Self {
        Self {
            runtime,
            forwarder: CancellationToken::new(),
        }
    }

    /// Installs the OS signal handlers and starts the sentinel task.
    pub async fn start(runtime: &Runtime) -> Result<Task<Self>, TaskError> {
        let sentinel = Self::new(runtime.clone());
        let (tx, rx) = mpsc::channel(8);
        forward(tx, sentinel.forwarder.clone()).map_err(TaskError::fail)?;
        Task::on_channel(runtime, sentinel, rx, TaskOptions::named("signals")).await
    }
}

#[async_trait]
impl Tasker for SignalSentinel {
    type Arg = Signal;

    async fn schedule(&self, _ctx: &TaskContext, arg: Option<Signal>) -> Result<(), TaskError> {
        let Some(signal) = arg else {
            return Ok(());
        };
        match signal {
            Signal::Terminate | Signal::Interrupt => {
                tracing::info!(?signal, "retire signal received");
                let runtime = self.runtime.clone();
                tokio::spawn(async move {
                    let _ = runtime.retire(0).await;
                });
            }
            Signal::Reload => {
                tracing::info!(?signal, "reload signal received");
                let runtime = self.runtime.clone();
                tokio::spawn(async move {
                    let _ = runtime.reload().await;
                });
            }
            Signal::User2 => tracing::debug!(?signal, "signal ignored"),
        }
        Ok(())
    }

    async fn retire(&self, _ctx: &TaskContext) -> Result<(), TaskError> {
        self.forwarder.cancel();
        Ok(())
    }
}

/// Spawns the forwarder; it drops `tx` (closing the channel) once `token` is cancelled.
#[cfg(unix)]
fn forward(tx: mpsc::Sender<Signal>, token: CancellationToken) -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = signal(SignalKind::terminate())?;
    let mut int = signal(SignalKind::interrupt())?;
    let mut usr1 = signal(SignalKind::user_defined1())?;
    let mut usr2 = signal(SignalKind::user_defined2())?;

    tokio::spawn(async move {
        loop {
            let sig = tokio::select! {
                _ = token.cancelled() => break,
                Some(()) = term.recv() => Signal::Terminate,
                Some(()) = int.recv() => Signal::Interrupt,
                Some(()) = usr1.recv() => Signal::Reload,
                Some(()) = usr2.recv() => Signal::User2,
                else => break,
            };
            if tx.send(sig).await.is_err() {
                break;
            }
        }
    });
    Ok(())
}

/// Spawns the forwarder; it drops `tx` (closing the channel) once `token` is cancelled.
#[cfg(not(unix))]
fn forward(tx: mpsc::Sender<Signal>, token: CancellationToken) -> std::io::Result<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                res = tokio::signal::ctrl_c() => {
                    if res.is_err() || tx.send(Signal::Interrupt).await.is_err() {
                        break;
                    }
                }
            }
        }
    });
    Ok(())
}
