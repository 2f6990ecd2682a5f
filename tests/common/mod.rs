#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use taskbase::{Config, ProcessControl, Runtime, TaskContext, TaskError, Tasker};

/// Records abort/exit/relaunch instead of acting on the test process.
#[derive(Default)]
pub struct Recorder {
    pub aborts: Mutex<Vec<String>>,
    pub exits: Mutex<Vec<i32>>,
    pub relaunches: AtomicUsize,
}

#[derive(Clone, Default)]
pub struct Control(pub Arc<Recorder>);

impl ProcessControl for Control {
    fn abort(&self, reason: &str) {
        self.0.aborts.lock().push(reason.to_string());
    }

    fn exit(&self, code: i32) {
        self.0.exits.lock().push(code);
    }

    fn relaunch(&self) -> std::io::Result<()> {
        self.0.relaunches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Config with every built-in task disabled.
pub fn quiet_config() -> Config {
    let mut cfg = Config::default();
    cfg.signals = false;
    cfg.liveness.enabled = false;
    cfg.memory.enabled = false;
    cfg
}

pub fn runtime(cfg: Config) -> (Runtime, Arc<Recorder>) {
    let control = Control::default();
    let rec = Arc::clone(&control.0);
    (Runtime::builder(cfg).with_control(control).build(), rec)
}

/// Polls `cond` for up to five seconds.
pub async fn eventually(cond: impl Fn() -> bool) -> bool {
    for _ in 0..500 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

#[derive(Default)]
pub struct Stats {
    pub schedules: AtomicUsize,
    pub reloads: AtomicUsize,
    pub retires: AtomicUsize,
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub fail_reload: AtomicBool,
}

impl Stats {
    pub fn schedules(&self) -> usize {
        self.schedules.load(Ordering::SeqCst)
    }

    pub fn reloads(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }

    pub fn retires(&self) -> usize {
        self.retires.load(Ordering::SeqCst)
    }
}

/// Behavior counting every call and keeping every trigger value.
pub struct Recording<A> {
    pub stats: Arc<Stats>,
    pub seen: Arc<Mutex<Vec<A>>>,
    fail_schedule: bool,
    hang_retire: bool,
}

impl<A> Recording<A> {
    pub fn new() -> Self {
        Self {
            stats: Arc::new(Stats::default()),
            seen: Arc::new(Mutex::new(Vec::new())),
            fail_schedule: false,
            hang_retire: false,
        }
    }

    pub fn failing_schedule(mut self) -> Self {
        self.fail_schedule = true;
        self
    }

    pub fn failing_reload(self) -> Self {
        self.stats.fail_reload.store(true, Ordering::SeqCst);
        self
    }

    pub fn hanging_retire(mut self) -> Self {
        self.hang_retire = true;
        self
    }
}

#[async_trait]
impl<A: Send + 'static> Tasker for Recording<A> {
    type Arg = A;

    async fn schedule(&self, _ctx: &TaskContext, arg: Option<A>) -> Result<(), TaskError> {
        let now = self.stats.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.max_active.fetch_max(now, Ordering::SeqCst);
        self.stats.schedules.fetch_add(1, Ordering::SeqCst);
        if let Some(arg) = arg {
            self.seen.lock().push(arg);
        }
        tokio::task::yield_now().await;
        self.stats.active.fetch_sub(1, Ordering::SeqCst);

        if self.fail_schedule {
            Err(TaskError::fail("schedule failed"))
        } else {
            Ok(())
        }
    }

    async fn reload(&self, _ctx: &TaskContext) -> Result<(), TaskError> {
        self.stats.reloads.fetch_add(1, Ordering::SeqCst);
        if self.stats.fail_reload.load(Ordering::SeqCst) {
            return Err(TaskError::fail("bad config"));
        }
        Ok(())
    }

    async fn retire(&self, _ctx: &TaskContext) -> Result<(), TaskError> {
        self.stats.retires.fetch_add(1, Ordering::SeqCst);
        if self.hang_retire {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}
