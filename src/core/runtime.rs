//! # Runtime: process-scoped state and global operations.
//!
//! A [`Runtime`] is the explicitly constructed owner of everything shared between
//! tasks: the reload/retire [`Orchestrator`], the [`Liveness`] registry, the current
//! [`Config`], the event [`Bus`] and the [`ProcessControl`] hook. Every task is
//! created against a runtime and keeps a clone of the handle.
//!
//! ## Lifecycle
//! ```text
//! Runtime::builder(cfg).build()       (init before any task)
//!     └─► Runtime::start()            watchdog + sentinels (per config)
//!     └─► Task::on_*(&runtime, ..)    tasks register reload/retire callbacks
//!
//! Runtime::reload()
//!   reload_lock ─► re-read config file (if any) ─► apply log level
//!               ─► ReloadStarted ─► group_run(reloads) ─► ReloadFinished
//!                                        └─ hang → abort
//!
//! Runtime::retire(code) / relaunch()
//!   retire_lock ─► [backtrace if code != 0] ─► RetireStarted
//!               ─► group_run(retires) ─► RetireFinished
//!               ─► [relaunch: spawn fresh process] ─► Exiting ─► exit(code)
//! ```
//!
//! ## Rules
//! - global reloads never interleave; global retires never interleave
//! - a hung batch always reaches [`ProcessControl::abort`]
//! - a failed config re-read keeps the previous config

use std::backtrace::Backtrace;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::config::Config;
use crate::core::app::AppInfo;
use crate::core::builder::RuntimeBuilder;
use crate::core::control::ProcessControl;
use crate::core::liveness::Liveness;
use crate::core::orchestrator::{Orchestrator, callback};
use crate::error::{RuntimeError, TaskError};
use crate::events::{Bus, Event, EventKind};
use crate::logging::LogHandle;

/// Cloneable handle to the process-scoped runtime state.
#[derive(Clone)]
pub struct Runtime {
    shared: Arc<Shared>,
}

struct Shared {
    cfg: RwLock<Arc<Config>>,
    config_path: Option<PathBuf>,
    bus: Bus,
    orchestrator: Orchestrator,
    liveness: Liveness,
    control: Arc<dyn ProcessControl>,
    log: Option<LogHandle>,
    app: AppInfo,
    started_at: SystemTime,
}

impl Runtime {
    /// Returns a builder for a runtime using `cfg`.
    pub fn builder(cfg: Config) -> RuntimeBuilder {
        RuntimeBuilder::new(cfg)
    }

    pub(crate) fn new_internal(
        cfg: Config,
        config_path: Option<PathBuf>,
        control: Arc<dyn ProcessControl>,
        log: Option<LogHandle>,
        app: AppInfo,
    ) -> Self {
        let bus = Bus::new(cfg.bus_capacity_clamped());
        Self {
            shared: Arc::new(Shared {
                cfg: RwLock::new(Arc::new(cfg)),
                config_path,
                bus,
                orchestrator: Orchestrator::new(),
                liveness: Liveness::new(),
                control,
                log,
                app,
                started_at: SystemTime::now(),
            }),
        }
    }

    /// Current configuration snapshot.
    pub fn config(&self) -> Arc<Config> {
        self.shared.cfg.read().clone()
    }

    /// File the configuration is re-read from on reload.
    pub fn config_path(&self) -> Option<&Path> {
        self.shared.config_path.as_deref()
    }

    /// Identity of the running process.
    pub fn app(&self) -> &AppInfo {
        &self.shared.app
    }

    /// Resolves `path` against `base_dir` (or the executable directory); absolute paths
    /// pass through.
    pub fn path(&self, path: impl AsRef<Path>) -> PathBuf {
        let cfg = self.config();
        self.shared.app.resolve(cfg.base_dir.as_deref(), path)
    }

    /// Event bus.
    pub fn bus(&self) -> &Bus {
        &self.shared.bus
    }

    /// Subscribes to runtime events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.shared.bus.subscribe()
    }

    /// Reload/retire registries.
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.shared.orchestrator
    }

    /// Liveness registry.
    pub fn liveness(&self) -> &Liveness {
        &self.shared.liveness
    }

    /// Registers (or refreshes) a liveness deadline.
    pub fn liver_register(&self, key: impl Into<String>, timeout: Duration) {
        self.shared.liveness.register(key, timeout);
    }

    /// Removes a liveness deadline.
    pub fn liver_cancel(&self, key: &str) -> bool {
        self.shared.liveness.cancel(key)
    }

    /// Registers a global reload callback for a non-task collaborator.
    pub fn register_reload<F, Fut>(&self, key: impl Into<String>, f: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        self.shared.orchestrator.register_reload(key, callback(f));
    }

    pub fn cancel_reload(&self, key: &str) {
        self.shared.orchestrator.cancel_reload(key);
    }

    /// Registers a global retire callback for a non-task collaborator.
    pub fn register_retire<F, Fut>(&self, key: impl Into<String>, f: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        self.shared.orchestrator.register_retire(key, callback(f));
    }

    pub fn cancel_retire(&self, key: &str) {
        self.shared.orchestrator.cancel_retire(key);
    }

    /// When the runtime was built.
    pub fn started_at(&self) -> SystemTime {
        self.shared.started_at
    }

    /// When the last global reload completed.
    pub fn reloaded_at(&self) -> Option<SystemTime> {
        self.shared.orchestrator.reloaded_at()
    }

    /// Reloads every registered task (and the config file, if known).
    ///
    /// Individual failures are logged; a batch that does not finish within
    /// `batch_timeout` aborts the process.
    pub async fn reload(&self) -> Result<(), RuntimeError> {
        let orch = &self.shared.orchestrator;
        let bus = &self.shared.bus;
        let _guard = orch.reload_lock.lock().await;

        self.refresh_config();
        let cfg = self.config();

        tracing::info!("global reload started");
        bus.publish(Event::new(EventKind::ReloadStarted));

        if let Err(e) = orch.run_reloads(cfg.batch_timeout, bus).await {
            self.abort(&e.to_string());
            return Err(e);
        }

        bus.publish(Event::new(EventKind::ReloadFinished));
        tracing::info!("global reload finished");
        Ok(())
    }

    /// Retires every registered task, then exits the process with `code`.
    pub async fn retire(&self, code: i32) -> Result<(), RuntimeError> {
        self.retire_with(code, false).await
    }

    /// Retires every registered task, starts a fresh copy of the process and exits.
    pub async fn relaunch(&self) -> Result<(), RuntimeError> {
        self.retire_with(0, true).await
    }

    async fn retire_with(&self, code: i32, relaunch: bool) -> Result<(), RuntimeError> {
        let orch = &self.shared.orchestrator;
        let bus = &self.shared.bus;
        let _guard = orch.retire_lock.lock().await;

        if code != 0 && !relaunch {
            let trace = Backtrace::force_capture();
            tracing::error!(code, backtrace = %trace, "retire with non-zero code");
        }

        tracing::info!(code, relaunch, "global retire started");
        bus.publish(Event::new(EventKind::RetireStarted).with_code(code));

        let cfg = self.config();
        if let Err(e) = orch.run_retires(cfg.batch_timeout, bus).await {
            self.abort(&e.to_string());
            return Err(e);
        }
        bus.publish(Event::new(EventKind::RetireFinished).with_code(code));

        let mut result = Ok(());
        let mut code = code;
        if relaunch {
            match self.shared.control.relaunch() {
                Ok(()) => bus.publish(Event::new(EventKind::Relaunched)),
                Err(e) => {
                    tracing::error!(error = %e, "relaunch failed");
                    code = 1;
                    result = Err(RuntimeError::Relaunch(e));
                }
            }
        }

        tracing::info!(code, "bye");
        bus.publish(Event::new(EventKind::Exiting).with_code(code));
        self.shared.control.exit(code);
        result
    }

    /// Hands an unrecoverable condition to the process-control hook.
    pub(crate) fn abort(&self, reason: &str) {
        tracing::error!(reason, "unrecoverable runtime condition");
        self.shared.control.abort(reason);
    }

    fn refresh_config(&self) {
        let Some(path) = &self.shared.config_path else {
            return;
        };
        match Config::load(path) {
            Ok(cfg) => {
                if let Some(log) = &self.shared.log {
                    if let Err(e) = log.set_level(&cfg.log.level) {
                        tracing::warn!(error = %e, "log level not applied");
                    }
                }
                *self.shared.cfg.write() = Arc::new(cfg);
                tracing::debug!(path = %path.display(), "config reloaded");
            }
            Err(e) => {
                tracing::warn!(error = %e, "config reload failed, keeping previous configuration");
            }
        }
    }
}
