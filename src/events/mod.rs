//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to lifecycle events emitted by tasks, the orchestrator
//! and the liveness watchdog.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Task` (start/fire/reload/stop), `Orchestrator` (batches),
//!   the watchdog (liveness expiry) and `Runtime` (relaunch/exit).
//! - **Consumers**: anything holding [`Runtime::subscribe`](crate::Runtime::subscribe).

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
