//! # Runtime configuration.
//!
//! Provides [`Config`], the centralized settings for the taskbase runtime.
//!
//! Config is used in two ways:
//! 1. **Runtime creation**: `Runtime::builder(config)`
//! 2. **Global reload**: when the runtime knows its config file, every
//!    [`Runtime::reload`](crate::Runtime::reload) re-reads it before fanning out.
//!
//! ## File format
//! TOML, every key optional. Durations are milliseconds.
//! ```toml
//! stop_timeout = 3000
//! batch_timeout = 10000
//! base_dir = "/opt/app"
//!
//! [liveness]
//! interval = 10000
//! alive_file = "run/app.alive"      # relative: resolved against base_dir
//!
//! [memory]
//! limit = 1073741824
//!
//! [log]
//! level = "debug"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::RuntimeError;

/// Lowest memory limit accepted by the memory sentinel (16 MiB).
pub const MIN_MEMORY_LIMIT: u64 = 16 * 1024 * 1024;

/// Global configuration for the runtime.
///
/// ## Field semantics
/// - `stop_timeout`: bound for a single [`Task::stop`](crate::Task::stop)
/// - `batch_timeout`: shared bound for one global reload/retire sweep (hang = fatal)
/// - `bus_capacity`: event bus ring buffer size (min 1)
/// - `signals`: install the signal sentinel on [`Runtime::start`](crate::Runtime::start)
/// - `base_dir`: root for relative paths (default: the executable's directory)
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum time `Task::stop` waits for the task to retire.
    #[serde(with = "duration_ms")]
    pub stop_timeout: Duration,

    /// Shared wall-clock bound for a global reload/retire batch.
    #[serde(with = "duration_ms")]
    pub batch_timeout: Duration,

    /// Capacity of the event bus broadcast channel.
    pub bus_capacity: usize,

    /// Whether `Runtime::start` installs the signal sentinel.
    pub signals: bool,

    /// Directory relative paths are resolved against.
    pub base_dir: Option<PathBuf>,

    /// Liveness watchdog settings.
    pub liveness: LivenessConfig,

    /// Memory sentinel settings.
    pub memory: MemoryConfig,

    /// Logging settings.
    pub log: LogConfig,
}

/// Liveness watchdog settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LivenessConfig {
    /// Whether `Runtime::start` launches the watchdog task.
    pub enabled: bool,
    /// How often the registry is scanned.
    #[serde(with = "duration_ms")]
    pub interval: Duration,
    /// File whose mtime is refreshed on every scan (relative to `base_dir`).
    pub alive_file: Option<PathBuf>,
}

/// Memory sentinel settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Whether `Runtime::start` launches the memory sentinel.
    pub enabled: bool,
    /// How often resident memory is sampled.
    #[serde(with = "duration_ms")]
    pub interval: Duration,
    /// Resident-set limit in bytes (`0` = default 1 GiB).
    pub limit: u64,
}

/// Logging settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive, e.g. `"info"` or `"taskbase=debug,info"`.
    pub level: String,
}

impl Config {
    /// Reads and parses a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RuntimeError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| RuntimeError::Config {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        Self::parse(&text).map_err(|error| RuntimeError::Config {
            path: path.to_path_buf(),
            error,
        })
    }

    /// Parses configuration from TOML text.
    pub fn parse(text: &str) -> Result<Self, String> {
        toml::from_str(text).map_err(|e| e.to_string())
    }

    /// Returns the stop bound, never zero.
    #[inline]
    pub fn stop_timeout(&self) -> Duration {
        self.stop_timeout.max(Duration::from_millis(1))
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl MemoryConfig {
    /// Effective limit: `0` means 1 GiB, anything below 16 MiB is raised to 16 MiB.
    pub fn effective_limit(&self) -> u64 {
        match self.limit {
            0 => 1024 * 1024 * 1024,
            n => n.max(MIN_MEMORY_LIMIT),
        }
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `stop_timeout = 3s`
    /// - `batch_timeout = 10s`
    /// - `bus_capacity = 1024`
    /// - `signals = true`
    fn default() -> Self {
        Self {
            stop_timeout: Duration::from_secs(3),
            batch_timeout: Duration::from_secs(10),
            bus_capacity: 1024,
            signals: true,
            base_dir: None,
            liveness: LivenessConfig::default(),
            memory: MemoryConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(10),
            alive_file: None,
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(20),
            limit: 0,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
