//! # Triggers: what wakes a task.
//!
//! [`Trigger`] is the construction-time description (a sum type over the seven trigger
//! types, each with its strongly typed resource). [`Trigger::acquire`] turns it into a
//! [`Source`] owned by the task loop; [`Source::wait`] is one nap.
//!
//! ## Nap per type
//! ```text
//! OnReload / Manual       nap.notified()
//! OnInterval (active)     nap.notified() | sleep(period)
//! OnInterval (sleeping)   nap.notified()
//! OnChannel               rx.recv()                         (None = closed → task ends)
//! OnTcp                   listener.accept()
//! OnFsChange              watcher event                     (errors logged, keep waiting)
//! every type              life.cancelled()                  (checked first)
//! ```
//!
//! ## Rules
//! - All waits are cancel-safe; leaving a nap early never loses a delivered value.
//! - Stopping the task always unblocks the wait (lifetime branch is biased first).
//! - Only idle and interval waits listen on `nap`; value-carrying sources fire solely on
//!   a delivered value, so every `schedule` there gets `Some(arg)`.

use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Notify, mpsc};
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;
use crate::tasks::{TaskBase, TaskKind};

/// Pause after a failed `accept` before trying again.
const ACCEPT_RETRY: Duration = Duration::from_millis(50);

/// Filesystem events buffered between the watcher thread and the task loop.
#[cfg(feature = "fs-watch")]
pub(crate) const FS_EVENT_BACKLOG: usize = 256;

/// Construction-time trigger with its type-specific resource.
pub(crate) enum Trigger<A> {
    OneTime,
    Manual,
    OnReload,
    Channel(mpsc::Receiver<A>),
    Interval(Duration),
    Tcp {
        addr: String,
        wrap: fn(TcpStream) -> A,
    },
    #[cfg(feature = "fs-watch")]
    FsWatch {
        path: std::path::PathBuf,
        wrap: fn(notify::Event) -> A,
    },
}

/// Trigger resource owned by a running loop.
pub(crate) enum Source<A> {
    Idle,
    Interval(Duration),
    Channel(mpsc::Receiver<A>),
    Tcp {
        listener: TcpListener,
        wrap: fn(TcpStream) -> A,
    },
    #[cfg(feature = "fs-watch")]
    FsWatch {
        // Dropping the watcher closes it; kept alive for the loop's lifetime.
        _watcher: notify::RecommendedWatcher,
        events: mpsc::Receiver<notify::Result<notify::Event>>,
        wrap: fn(notify::Event) -> A,
    },
}

/// Result of [`Trigger::acquire`].
pub(crate) enum Setup<A> {
    /// One-shot: run once, then end.
    Once,
    /// Manual: no loop, fired explicitly.
    Manual,
    /// Looping task with its resource.
    Loop(Source<A>),
}

/// Outcome of one nap.
pub(crate) enum Wake<A> {
    /// Run `schedule` (with a trigger value, if any).
    Fire(Option<A>),
    /// The trigger resource closed; the task's lifetime ends.
    Closed,
    /// The task's lifetime was cancelled.
    Died,
}

impl<A> Trigger<A> {
    pub(crate) fn kind(&self) -> TaskKind {
        match self {
            Trigger::OneTime => TaskKind::OneTime,
            Trigger::Manual => TaskKind::Manual,
            Trigger::OnReload => TaskKind::OnReload,
            Trigger::Channel(_) => TaskKind::OnChannel,
            Trigger::Interval(_) => TaskKind::OnInterval,
            Trigger::Tcp { .. } => TaskKind::OnTcp,
            #[cfg(feature = "fs-watch")]
            Trigger::FsWatch { .. } => TaskKind::OnFsChange,
        }
    }

    /// Acquires the trigger resource (bind listener, open watcher).
    pub(crate) async fn acquire(self, base: &TaskBase) -> Result<Setup<A>, TaskError> {
        match self {
            Trigger::OneTime => Ok(Setup::Once),
            Trigger::Manual => Ok(Setup::Manual),
            Trigger::OnReload => Ok(Setup::Loop(Source::Idle)),
            Trigger::Channel(rx) => Ok(Setup::Loop(Source::Channel(rx))),
            Trigger::Interval(period) => Ok(Setup::Loop(Source::Interval(period))),
            Trigger::Tcp { addr, wrap } => {
                let listener = match TcpListener::bind(addr.as_str()).await {
                    Ok(listener) => listener,
                    Err(source) => return Err(TaskError::Bind { addr, source }),
                };
                if let Ok(local) = listener.local_addr() {
                    base.set_local_addr(local);
                }
                Ok(Setup::Loop(Source::Tcp { listener, wrap }))
            }
            #[cfg(feature = "fs-watch")]
            Trigger::FsWatch { path, wrap } => {
                use notify::Watcher;

                let watch_err = |e: notify::Error| TaskError::Watch {
                    path: path.clone(),
                    error: e.to_string(),
                };
                let (tx, events) = mpsc::channel::<notify::Result<notify::Event>>(FS_EVENT_BACKLOG);
                let span = base.span().clone();
                let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
                    if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(res) {
                        tracing::warn!(parent: &span, "filesystem event backlog full, event dropped");
                    }
                })
                .map_err(watch_err)?;
                watcher
                    .watch(&path, notify::RecursiveMode::NonRecursive)
                    .map_err(watch_err)?;
                Ok(Setup::Loop(Source::FsWatch {
                    _watcher: watcher,
                    events,
                    wrap,
                }))
            }
        }
    }
}

/// Whether `nap` can end a loop wait for tasks of `kind`.
pub(crate) fn wakes_on_nap(kind: TaskKind) -> bool {
    matches!(kind, TaskKind::OnReload | TaskKind::OnInterval)
}

impl<A> Source<A> {
    /// Period of an interval source.
    pub(crate) fn period(&self) -> Option<Duration> {
        match self {
            Source::Interval(period) => Some(*period),
            _ => None,
        }
    }

    /// Waits for the next trigger, an early wake on `nap` (idle and interval only), or
    /// the end of `life`.
    pub(crate) async fn wait(
        &mut self,
        life: &CancellationToken,
        nap: &Notify,
        base: &TaskBase,
    ) -> Wake<A> {
        loop {
            match self {
                Source::Idle => {
                    tokio::select! {
                        biased;
                        _ = life.cancelled() => return Wake::Died,
                        _ = nap.notified() => return Wake::Fire(None),
                    }
                }
                Source::Interval(period) => {
                    if base.is_sleeping() {
                        tokio::select! {
                            biased;
                            _ = life.cancelled() => return Wake::Died,
                            _ = nap.notified() => return Wake::Fire(None),
                        }
                    }
                    tokio::select! {
                        biased;
                        _ = life.cancelled() => return Wake::Died,
                        _ = nap.notified() => return Wake::Fire(None),
                        _ = time::sleep(*period) => return Wake::Fire(None),
                    }
                }
                Source::Channel(rx) => {
                    tokio::select! {
                        biased;
                        _ = life.cancelled() => return Wake::Died,
                        val = rx.recv() => return match val {
                            Some(val) => Wake::Fire(Some(val)),
                            None => Wake::Closed,
                        },
                    }
                }
                Source::Tcp { listener, wrap } => {
                    tokio::select! {
                        biased;
                        _ = life.cancelled() => return Wake::Died,
                        res = listener.accept() => match res {
                            Ok((stream, _peer)) => return Wake::Fire(Some((*wrap)(stream))),
                            Err(e) => {
                                tracing::error!(parent: base.span(), error = %e, "accept tcp listener error");
                            }
                        },
                    }
                    tokio::select! {
                        biased;
                        _ = life.cancelled() => return Wake::Died,
                        _ = time::sleep(ACCEPT_RETRY) => {}
                    }
                }
                #[cfg(feature = "fs-watch")]
                Source::FsWatch { events, wrap, .. } => {
                    tokio::select! {
                        biased;
                        _ = life.cancelled() => return Wake::Died,
                        ev = events.recv() => match ev {
                            Some(Ok(ev)) => return Wake::Fire(Some((*wrap)(ev))),
                            Some(Err(e)) => {
                                tracing::warn!(parent: base.span(), error = %e, "filesystem watcher error");
                            }
                            None => return Wake::Closed,
                        },
                    }
                }
            }
        }
    }
}

#[cfg(all(test, feature = "fs-watch"))]
mod tests {
    use super::*;
    use crate::tasks::TaskOptions;

    #[tokio::test]
    async fn test_fs_event_backlog_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let base = TaskBase::new(TaskKind::OnFsChange, &TaskOptions::named("fs"));
        let trigger: Trigger<notify::Event> = Trigger::FsWatch {
            path: dir.path().to_path_buf(),
            wrap: |ev| ev,
        };
        let Ok(Setup::Loop(Source::FsWatch {
            _watcher,
            mut events,
            ..
        })) = trigger.acquire(&base).await
        else {
            panic!("watcher not acquired");
        };

        for i in 0..FS_EVENT_BACKLOG * 2 {
            std::fs::write(dir.path().join(format!("f{i}")), "x").unwrap();
        }
        tokio::time::sleep(Duration::from_millis(500)).await;

        let mut queued = 0;
        while events.try_recv().is_ok() {
            queued += 1;
        }
        assert!(queued > 0);
        assert!(queued <= FS_EVENT_BACKLOG);
    }
}
