//! # Built-in tasks.
//!
//! [`Runtime::start`] brings up the tasks every process runs next to its own:
//!
//! | Task            | Trigger     | Effect                                          |
//! |-----------------|-------------|-------------------------------------------------|
//! | watchdog        | interval    | aborts on expired liveness keys, touches alive file |
//! | signals         | channel     | SIGTERM/SIGINT → retire(0), SIGUSR1 → reload    |
//! | memory          | interval    | resident memory over limit → relaunch           |
//! | config watcher  | fs change   | config file changed → reload                    |
//!
//! Each one is optional: watchdog/memory/signals follow `Config`, the config watcher runs
//! when the runtime knows its config path (feature `fs-watch`).

#[cfg(feature = "fs-watch")]
mod config_watch;
mod memory;
mod signals;

#[cfg(feature = "fs-watch")]
pub use config_watch::ConfigWatch;
pub use memory::{MemorySentinel, Probe, resident_bytes};
pub use signals::{Signal, SignalSentinel};

use crate::core::{Runtime, Task, Watchdog};
use crate::error::TaskError;
use crate::tasks::TaskOptions;

/// Handles of the built-in tasks started by [`Runtime::start`].
#[derive(Default)]
pub struct Sentinels {
    pub watchdog: Option<Task<Watchdog>>,
    pub signals: Option<Task<SignalSentinel>>,
    pub memory: Option<Task<MemorySentinel>>,
    #[cfg(feature = "fs-watch")]
    pub config: Option<Task<ConfigWatch>>,
}

impl Sentinels {
    /// Stops every started built-in task; returns the first error.
    pub async fn stop(&self) -> Result<(), TaskError> {
        let mut results = Vec::new();
        if let Some(t) = &self.watchdog {
            results.push(t.stop().await);
        }
        if let Some(t) = &self.signals {
            results.push(t.stop().await);
        }
        if let Some(t) = &self.memory {
            results.push(t.stop().await);
        }
        #[cfg(feature = "fs-watch")]
        if let Some(t) = &self.config {
            results.push(t.stop().await);
        }
        results.into_iter().collect()
    }
}

impl Runtime {
    /// Starts the built-in tasks enabled by the configuration.
    ///
    /// On failure the tasks started so far are stopped again.
    pub async fn start(&self) -> Result<Sentinels, TaskError> {
        let mut sentinels = Sentinels::default();
        if let Err(e) = self.start_into(&mut sentinels).await {
            tracing::error!(error = %e, "runtime start failed");
            let _ = sentinels.stop().await;
            return Err(e);
        }
        tracing::info!("runtime started");
        Ok(sentinels)
    }

    async fn start_into(&self, sentinels: &mut Sentinels) -> Result<(), TaskError> {
        let cfg = self.config();

        if cfg.liveness.enabled {
            let watchdog = Task::on_interval(
                self,
                Watchdog::new(self.clone()),
                cfg.liveness.interval,
                TaskOptions::named("liver").with_liveness(false),
            )
            .await?;
            sentinels.watchdog = Some(watchdog);
        }
        if cfg.signals {
            sentinels.signals = Some(SignalSentinel::start(self).await?);
        }
        if cfg.memory.enabled {
            sentinels.memory = Some(MemorySentinel::start(self).await?);
        }
        #[cfg(feature = "fs-watch")]
        if let Some(path) = self.config_path() {
            let path = path.to_path_buf();
            sentinels.config = Some(ConfigWatch::start(self, &path).await?);
        }
        Ok(())
    }
}
