//! Runtime core: task lifecycle, orchestration and liveness.
//!
//! The public API of this module is the [`Runtime`] handle (plus its builder), the
//! [`Task`] handle, the [`Orchestrator`] and [`Liveness`] registries and the
//! [`ProcessControl`] seam.
//!
//! Internal modules:
//! - [`runtime`]: process-scoped state, global reload/retire/relaunch;
//! - [`builder`]: runtime construction;
//! - [`task`]: per-task handle, construction and loop;
//! - [`trigger`]: trigger sum type and per-type waits;
//! - [`runner`]: executes one `schedule` call with an optional bound;
//! - [`orchestrator`]: reload/retire registries and the bounded parallel batch;
//! - [`liveness`]: deadline registry and watchdog behavior;
//! - [`control`]: abort/exit/relaunch seam;
//! - [`app`]: process identity and path resolution.

mod app;
mod builder;
mod control;
mod liveness;
mod orchestrator;
mod runner;
mod runtime;
mod task;
mod trigger;

pub use app::AppInfo;
pub use builder::RuntimeBuilder;
pub use control::{ProcessControl, SystemControl};
pub use liveness::{Expired, Liveness, Watchdog};
pub use orchestrator::{Callback, Orchestrator, callback};
pub use runtime::Runtime;
pub use task::Task;
