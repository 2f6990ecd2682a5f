use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::core::app::AppInfo;
use crate::core::control::{ProcessControl, SystemControl};
use crate::core::runtime::Runtime;
use crate::error::RuntimeError;
use crate::logging::LogHandle;

/// Builder for constructing a [`Runtime`] with optional features.
pub struct RuntimeBuilder {
    cfg: Config,
    config_path: Option<PathBuf>,
    control: Option<Arc<dyn ProcessControl>>,
    log: Option<LogHandle>,
    app: Option<AppInfo>,
}

impl RuntimeBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            config_path: None,
            control: None,
            log: None,
            app: None,
        }
    }

    /// Loads the configuration from `path` and remembers the path for reloads.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RuntimeError> {
        let path = path.as_ref();
        let cfg = Config::load(path)?;
        Ok(Self::new(cfg).with_config_path(path))
    }

    /// Re-reads `path` on every global reload (and watches it when started).
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Replaces the process-control hook (default: [`SystemControl`]).
    ///
    /// Tests install a recording implementation to observe abort/exit paths.
    pub fn with_control(mut self, control: impl ProcessControl) -> Self {
        self.control = Some(Arc::new(control));
        self
    }

    /// Lets global reloads apply `log.level` through `handle`.
    pub fn with_log_handle(mut self, handle: LogHandle) -> Self {
        self.log = Some(handle);
        self
    }

    /// Overrides the detected process identity.
    pub fn with_app(mut self, app: AppInfo) -> Self {
        self.app = Some(app);
        self
    }

    /// Builds the runtime.
    ///
    /// Built-in tasks are not running yet; see [`Runtime::start`].
    pub fn build(self) -> Runtime {
        let control = self
            .control
            .unwrap_or_else(|| Arc::new(SystemControl) as Arc<dyn ProcessControl>);
        let app = self.app.unwrap_or_else(AppInfo::detect);
        Runtime::new_internal(self.cfg, self.config_path, control, self.log, app)
    }
}
