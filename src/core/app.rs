//! # Process identity.
//!
//! [`AppInfo`] is captured once when a [`Runtime`](crate::Runtime) is built: the executable
//! name and directory, and the working directory at startup. [`AppInfo::resolve`] turns a
//! relative path from the configuration into an absolute one.
//!
//! ## Resolution
//! ```text
//! absolute path          → unchanged
//! relative, base_dir set → base_dir / path
//! relative otherwise     → exec_dir / path
//! ```

use std::path::{Path, PathBuf};

/// Identity of the running process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppInfo {
    name: String,
    exec_dir: PathBuf,
    work_dir: PathBuf,
}

impl AppInfo {
    /// Reads the executable path and working directory of this process.
    ///
    /// Missing information falls back to `.` and the name `app`.
    pub fn detect() -> Self {
        let work_dir = std::env::current_dir().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "working directory unavailable");
            PathBuf::from(".")
        });
        let (name, exec_dir) = match std::env::current_exe() {
            Ok(exe) => (
                exe.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "app".to_string()),
                exe.parent().map(Path::to_path_buf).unwrap_or_else(|| work_dir.clone()),
            ),
            Err(e) => {
                tracing::warn!(error = %e, "executable path unavailable");
                ("app".to_string(), work_dir.clone())
            }
        };

        Self {
            name,
            exec_dir,
            work_dir,
        }
    }

    /// Builds an identity from explicit parts.
    pub fn new(name: impl Into<String>, exec_dir: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            exec_dir: exec_dir.into(),
            work_dir: work_dir.into(),
        }
    }

    /// Application name (executable file name).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory holding the executable.
    pub fn exec_dir(&self) -> &Path {
        &self.exec_dir
    }

    /// Working directory at startup.
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Resolves `path` against `base_dir`, or the executable directory when unset.
    pub fn resolve(&self, base_dir: Option<&Path>, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            return path.to_path_buf();
        }
        base_dir.unwrap_or(&self.exec_dir).join(path)
    }
}
