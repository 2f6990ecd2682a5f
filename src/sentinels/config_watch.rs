//! # Config file watcher.
//!
//! Filesystem-event task on the directory holding the config file. A create or modify
//! event naming the file triggers a global reload (which re-reads the file).
//!
//! The directory is watched rather than the file so editors that replace the file
//! (write to temp, rename over) keep being noticed.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use notify::EventKind as FsEventKind;

use crate::core::{Runtime, Task};
use crate::error::TaskError;
use crate::tasks::{TaskContext, TaskOptions, Tasker};

/// Behavior of the config watcher task.
pub struct ConfigWatch {
    runtime: Runtime,
    file: OsString,
}

impl ConfigWatch {
    /// Starts watching `path`.
    pub async fn start(runtime: &Runtime, path: &Path) -> Result<Task<Self>, TaskError> {
        let file = path
            .file_name()
            .map(OsString::from)
            .ok_or_else(|| TaskError::Watch {
                path: path.to_path_buf(),
                error: "not a file path".to_string(),
            })?;
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let watch = Self {
            runtime: runtime.clone(),
            file,
        };
        Task::on_fs_change(runtime, watch, dir, TaskOptions::named("config-watch")).await
    }

    fn concerns(&self, event: &notify::Event) -> bool {
        matches!(event.kind, FsEventKind::Create(_) | FsEventKind::Modify(_))
            && event
                .paths
                .iter()
                .any(|p| p.file_name() == Some(self.file.as_os_str()))
    }
}

#[async_trait]
impl Tasker for ConfigWatch {
    type Arg = notify::Event;

    async fn schedule(&self, _ctx: &TaskContext, arg: Option<notify::Event>) -> Result<(), TaskError> {
        match arg {
            Some(event) if self.concerns(&event) => {
                tracing::info!(kind = ?event.kind, "config file changed");
                let runtime = self.runtime.clone();
                tokio::spawn(async move {
                    let _ = runtime.reload().await;
                });
            }
            _ => {}
        }
        Ok(())
    }
}
