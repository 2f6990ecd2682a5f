use tracing::Span;

/// Optional overrides accepted by every construction entry point.
///
/// Unset fields fall back to per-type defaults:
/// - `name`: `anonymous/<id>`
/// - `span`: `info_span!("task", task, id)`
/// - `immediately`: on for reload- and interval-driven tasks, off otherwise
/// - `sleep`: off
/// - `liveness`: on (interval tasks only)
#[derive(Clone, Debug, Default)]
pub struct TaskOptions {
    pub(crate) name: Option<String>,
    pub(crate) span: Option<Span>,
    pub(crate) immediately: Option<bool>,
    pub(crate) sleep: bool,
    pub(crate) liveness: Option<bool>,
}

impl TaskOptions {
    /// Options with every field at its default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for `TaskOptions::new().with_name(name)`.
    pub fn named(name: impl Into<String>) -> Self {
        Self::new().with_name(name)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Uses `span` instead of the default task span.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Runs `schedule` once at start without waiting for the first trigger.
    pub fn with_immediately(mut self, immediately: bool) -> Self {
        self.immediately = Some(immediately);
        self
    }

    /// Starts an interval task with periodic firing suspended.
    pub fn with_sleep(mut self, sleep: bool) -> Self {
        self.sleep = sleep;
        self
    }

    /// Enables or disables the liveness heartbeat of an interval task.
    pub fn with_liveness(mut self, liveness: bool) -> Self {
        self.liveness = Some(liveness);
        self
    }
}
