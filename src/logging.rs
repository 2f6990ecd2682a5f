//! # Logging setup.
//!
//! [`init`] installs the global `tracing` subscriber: a `fmt` layer filtered by an
//! `EnvFilter` that sits behind a `reload` layer. The returned [`LogHandle`] is
//! handed to [`RuntimeBuilder::with_log_handle`](crate::RuntimeBuilder::with_log_handle)
//! so a global reload can apply a new `log.level` without restarting.
//!
//! `RUST_LOG`, when set, wins over the configured level at startup.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, fmt, reload};

use crate::config::LogConfig;
use crate::error::RuntimeError;

/// Handle to swap the active log filter.
#[derive(Clone)]
pub struct LogHandle {
    inner: reload::Handle<EnvFilter, Registry>,
}

impl LogHandle {
    /// Replaces the active filter with `level` (an `EnvFilter` directive).
    pub fn set_level(&self, level: &str) -> Result<(), RuntimeError> {
        let filter = parse(level)?;
        self.inner.reload(filter).map_err(|e| RuntimeError::Logging {
            error: e.to_string(),
        })?;
        tracing::debug!(level, "log level applied");
        Ok(())
    }
}

/// Installs the global subscriber.
///
/// Fails if a global subscriber is already installed or `cfg.level` is not a valid
/// filter directive.
pub fn init(cfg: &LogConfig) -> Result<LogHandle, RuntimeError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => parse(&cfg.level)?,
    };
    let (filter, handle) = reload::Layer::new(filter);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init()
        .map_err(|e| RuntimeError::Logging {
            error: e.to_string(),
        })?;

    Ok(LogHandle { inner: handle })
}

fn parse(level: &str) -> Result<EnvFilter, RuntimeError> {
    EnvFilter::try_new(level).map_err(|e| RuntimeError::Logging {
        error: format!("invalid level {level:?}: {e}"),
    })
}
