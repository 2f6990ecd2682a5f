//! # Process control seam.
//!
//! Every path that ends the process (batch hang, liveness expiry, construction-time
//! reload failure, retire) goes through [`ProcessControl`]. Production uses
//! [`SystemControl`]; embedders and tests install their own implementation to observe
//! those paths without killing the host.

use std::process::{Command, Stdio};

/// Terminal process operations used by the runtime.
pub trait ProcessControl: Send + Sync + 'static {
    /// Unrecoverable condition: the process must not keep running half-alive.
    ///
    /// The runtime has already logged the diagnostics when this is called.
    fn abort(&self, reason: &str);

    /// Terminates the process with `code` after a retire sweep.
    fn exit(&self, code: i32);

    /// Starts a fresh instance of the current executable with the same arguments.
    fn relaunch(&self) -> std::io::Result<()>;
}

/// [`ProcessControl`] acting on the real process.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemControl;

impl ProcessControl for SystemControl {
    fn abort(&self, _reason: &str) {
        std::process::abort();
    }

    fn exit(&self, code: i32) {
        std::process::exit(code);
    }

    fn relaunch(&self) -> std::io::Result<()> {
        let exe = std::env::current_exe()?;
        let child = Command::new(exe)
            .args(std::env::args_os().skip(1))
            .stdin(Stdio::null())
            .spawn()?;
        tracing::info!(pid = child.id(), "relaunched process");
        Ok(())
    }
}
