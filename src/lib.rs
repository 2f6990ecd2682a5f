//! # taskbase
//!
//! **Taskbase** is a process-wide task lifecycle runtime for tokio services.
//!
//! Every piece of long-lived work in a process (a TCP listener, a periodic job, a
//! channel consumer, a config reloader) is a [`Task`]: one behavior ([`Tasker`]), one
//! trigger type, one loop. The [`Runtime`] reloads all of them together, retires all of
//! them together and aborts the process when one of them stops making progress.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   Tasker #1          Tasker #2          Tasker #3
//!  (on_interval)      (on_tcp)           (on_channel)
//!       │                  │                  │
//!       ▼                  ▼                  ▼
//!  ┌──────────┐       ┌──────────┐       ┌──────────┐
//!  │  Task    │       │  Task    │       │  Task    │   one routine each:
//!  │ routine  │       │ routine  │       │ routine  │   wait trigger → schedule
//!  └─┬──┬─────┘       └─┬────────┘       └─┬────────┘
//!    │  │ heartbeat      │ reload/retire    │ reload/retire callbacks
//!    │  ▼                ▼                  ▼
//!    │ ┌─────────┐ ┌───────────────────────────────────────────────┐
//!    │ │Liveness │ │ Orchestrator (reload / retire registries)     │
//!    │ └────▲────┘ └───────────────▲───────────────────────────────┘
//!    │      │ scan                 │ group_run (shared timeout)
//!    │ ┌────┴─────┐       ┌────────┴──────────┐
//!    │ │ Watchdog │       │ Runtime::reload   │◄── SIGUSR1, config file change
//!    │ └──────────┘       │ Runtime::retire   │◄── SIGTERM / SIGINT
//!    │                    │ Runtime::relaunch │◄── memory over limit
//!    │                    └────────┬──────────┘
//!    ▼                             ▼
//!  ┌───────────────────────────────────────────┐
//!  │ Bus (broadcast lifecycle events)          │
//!  └───────────────────────────────────────────┘
//! ```
//!
//! ### Fatal paths
//! A hung reload/retire batch, an expired liveness key and a task that fails its first
//! reload all end in [`ProcessControl::abort`]. The default [`SystemControl`] aborts the
//! process; tests and embedders may install their own hook.
//!
//! ## Features
//! | Area              | Description                                                   | Key types / traits                     |
//! |-------------------|---------------------------------------------------------------|----------------------------------------|
//! | **Tasks**         | Seven trigger types around one behavior contract.             | [`Task`], [`Tasker`], [`TaskFn`]       |
//! | **Orchestration** | Global reload/retire as bounded parallel batches.             | [`Runtime`], [`Orchestrator`]          |
//! | **Liveness**      | Heartbeat deadlines checked by a watchdog.                    | [`Liveness`], [`Watchdog`]             |
//! | **Sentinels**     | Signals, memory pressure, config file changes.                | [`Sentinels`], [`Signal`]              |
//! | **Events**        | Lifecycle events on a broadcast bus.                          | [`Event`], [`EventKind`]               |
//! | **Errors**        | Typed errors for the runtime and tasks.                       | [`TaskError`], [`RuntimeError`]        |
//! | **Configuration** | TOML config, re-read on reload.                               | [`Config`]                             |
//!
//! ## Optional features
//! - `fs-watch` (default): filesystem-event tasks ([`Task::on_fs_change`]) and the config
//!   file watcher.
//!
//! ## Example
//! ```rust,no_run
//! use std::time::Duration;
//! use taskbase::{Config, Runtime, Task, TaskContext, TaskError, TaskFn, TaskOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = Config::default();
//!     let log = taskbase::logging::init(&cfg.log)?;
//!     let rt = Runtime::builder(cfg).with_log_handle(log).build();
//!     let _sentinels = rt.start().await?;
//!
//!     let _tick = Task::on_interval(
//!         &rt,
//!         TaskFn::new(|ctx: TaskContext, _arg: Option<()>| async move {
//!             tracing::info!(task = ctx.name(), "tick");
//!             Ok::<_, TaskError>(())
//!         }),
//!         Duration::from_secs(5),
//!         TaskOptions::named("tick"),
//!     )
//!     .await?;
//!
//!     // SIGTERM retires every task and exits.
//!     std::future::pending::<()>().await;
//!     Ok(())
//! }
//! ```
mod config;
mod core;
mod error;
mod events;
pub mod logging;
mod sentinels;
mod tasks;

// ---- Public re-exports ----

pub use config::{Config, LivenessConfig, LogConfig, MIN_MEMORY_LIMIT, MemoryConfig};
pub use crate::core::{
    AppInfo, Callback, Expired, Liveness, Orchestrator, ProcessControl, Runtime, RuntimeBuilder,
    SystemControl, Task, Watchdog, callback,
};
pub use error::{RuntimeError, TaskError};
pub use events::{Bus, Event, EventKind};
pub use logging::LogHandle;
pub use sentinels::{MemorySentinel, Probe, Sentinels, Signal, SignalSentinel, resident_bytes};
pub use tasks::{TaskBase, TaskContext, TaskFn, TaskKind, TaskOptions, Tasker};

#[cfg(feature = "fs-watch")]
pub use sentinels::ConfigWatch;
