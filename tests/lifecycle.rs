mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use common::{Recording, eventually, quiet_config, runtime};
use parking_lot::Mutex;
use taskbase::{EventKind, Task, TaskContext, TaskError, TaskKind, TaskOptions, Tasker};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Instant;

#[tokio::test]
async fn test_stop_is_idempotent_for_every_type() {
    let (rt, _rec) = runtime(quiet_config());

    macro_rules! check {
        ($task:expr, $stats:expr) => {{
            let task = $task;
            task.stop().await.unwrap();
            assert!(task.died(), "{} not dead", task.kind());
            task.stop().await.unwrap();
            assert_eq!($stats.retires(), 1, "{} retired twice", task.kind());
        }};
    }

    let b = Recording::<()>::new();
    let s = b.stats.clone();
    check!(Task::one_time(&rt, b, TaskOptions::named("once")).await.unwrap(), s);

    let b = Recording::<()>::new();
    let s = b.stats.clone();
    check!(Task::manual(&rt, b, TaskOptions::named("manual")).await.unwrap(), s);

    let b = Recording::<()>::new();
    let s = b.stats.clone();
    check!(Task::on_reload(&rt, b, TaskOptions::named("reload")).await.unwrap(), s);

    let b = Recording::<()>::new();
    let s = b.stats.clone();
    check!(
        Task::on_interval(&rt, b, Duration::from_millis(50), TaskOptions::named("tick"))
            .await
            .unwrap(),
        s
    );

    let b = Recording::<u32>::new();
    let s = b.stats.clone();
    let (_tx, rx) = mpsc::channel(4);
    check!(Task::on_channel(&rt, b, rx, TaskOptions::named("chan")).await.unwrap(), s);

    let b = Recording::<TcpStream>::new();
    let s = b.stats.clone();
    check!(
        Task::on_tcp(&rt, b, "127.0.0.1:0", TaskOptions::named("tcp")).await.unwrap(),
        s
    );

    #[cfg(feature = "fs-watch")]
    {
        let dir = tempfile::tempdir().unwrap();
        let b = Recording::<notify::Event>::new();
        let s = b.stats.clone();
        check!(
            Task::on_fs_change(&rt, b, dir.path(), TaskOptions::named("fs")).await.unwrap(),
            s
        );
    }

    assert!(rt.orchestrator().reload_keys().is_empty());
    assert!(rt.orchestrator().retire_keys().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_interval_fires_once_per_period_never_concurrently() {
    let (rt, _rec) = runtime(quiet_config());
    let b = Recording::<()>::new();
    let stats = b.stats.clone();

    let task = Task::on_interval(
        &rt,
        b,
        Duration::from_millis(100),
        TaskOptions::named("tick").with_immediately(false),
    )
    .await
    .unwrap();

    tokio::time::sleep(Duration::from_millis(1000)).await;
    let n = stats.schedules();
    assert!((9..=11).contains(&n), "schedule ran {n} times");
    assert_eq!(stats.max_active.load(Ordering::SeqCst), 1);

    task.stop().await.unwrap();
    let after = stats.schedules();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(stats.schedules(), after);
}

#[tokio::test]
async fn test_channel_values_arrive_in_order_and_close_ends_task() {
    let (rt, _rec) = runtime(quiet_config());
    let b = Recording::<u32>::new();
    let (stats, seen) = (b.stats.clone(), b.seen.clone());

    let (tx, rx) = mpsc::channel(8);
    let task = Task::on_channel(&rt, b, rx, TaskOptions::named("chan"))
        .await
        .unwrap();

    for v in 1..=5 {
        tx.send(v).await.unwrap();
    }
    assert!(eventually(|| stats.schedules() == 5).await);
    assert!(!task.died());

    drop(tx);
    assert!(eventually(|| task.died() && task.retired()).await);
    assert_eq!(*seen.lock(), vec![1, 2, 3, 4, 5]);
    assert_eq!(stats.retires(), 1);
    assert!(rt.orchestrator().retire_keys().is_empty());

    task.stop().await.unwrap();
    assert_eq!(stats.retires(), 1);
}

#[tokio::test]
async fn test_manual_immediate_runs_once_and_fire_after_stop_fails() {
    let (rt, _rec) = runtime(quiet_config());
    let b = Recording::<()>::new();
    let stats = b.stats.clone();

    let task = Task::manual(&rt, b, TaskOptions::named("manual").with_immediately(true))
        .await
        .unwrap();
    assert_eq!(stats.schedules(), 1);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(stats.schedules(), 1);

    task.fire().await.unwrap();
    assert_eq!(stats.schedules(), 2);

    task.stop().await.unwrap();
    let err = task.fire().await.unwrap_err();
    assert!(matches!(err, TaskError::Dead { .. }));
    assert_eq!(stats.schedules(), 2);
}

#[tokio::test]
async fn test_one_time_returns_schedule_error() {
    let (rt, _rec) = runtime(quiet_config());
    let b = Recording::<()>::new().failing_schedule();
    let stats = b.stats.clone();

    let err = Task::one_time(&rt, b, TaskOptions::named("once"))
        .await
        .err()
        .unwrap();
    assert_eq!(err.as_label(), "task_failed");
    assert_eq!(stats.retires(), 1);
}

#[tokio::test]
async fn test_looping_task_survives_schedule_errors() {
    let (rt, _rec) = runtime(quiet_config());
    let mut events = rt.subscribe();
    let b = Recording::<u32>::new().failing_schedule();
    let stats = b.stats.clone();

    let (tx, rx) = mpsc::channel(8);
    let task = Task::on_channel(&rt, b, rx, TaskOptions::named("chan"))
        .await
        .unwrap();
    tx.send(1).await.unwrap();
    tx.send(2).await.unwrap();

    assert!(eventually(|| stats.schedules() == 2).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!task.died());

    let mut failed = 0;
    while let Ok(ev) = events.try_recv() {
        if ev.kind == EventKind::ScheduleFailed {
            failed += 1;
        }
    }
    assert_eq!(failed, 2);
    task.stop().await.unwrap();
}

#[tokio::test]
async fn test_construction_reload_failure_aborts() {
    let (rt, rec) = runtime(quiet_config());
    let b = Recording::<()>::new().failing_reload();
    let stats = b.stats.clone();

    let err = Task::on_reload(&rt, b, TaskOptions::named("broken"))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, TaskError::Reload { .. }));
    assert_eq!(rec.aborts.lock().len(), 1);
    assert!(rec.aborts.lock()[0].contains("broken"));
    assert_eq!(stats.schedules(), 0);
    assert!(rt.orchestrator().reload_keys().is_empty());
}

#[tokio::test]
async fn test_later_reload_failure_keeps_task_running() {
    let (rt, rec) = runtime(quiet_config());
    let b = Recording::<()>::new();
    let stats = b.stats.clone();

    let task = Task::on_reload(&rt, b, TaskOptions::named("cfg").with_immediately(false))
        .await
        .unwrap();
    assert_eq!(stats.reloads(), 1);

    stats.fail_reload.store(true, Ordering::SeqCst);
    let err = task.reload().await.unwrap_err();
    assert_eq!(err.as_label(), "task_reload");
    assert!(!task.died());
    assert!(rec.aborts.lock().is_empty());

    stats.fail_reload.store(false, Ordering::SeqCst);
    task.reload().await.unwrap();
    assert!(eventually(|| stats.schedules() == 1).await);
    task.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_stop_timeout_is_surfaced() {
    let mut cfg = quiet_config();
    cfg.stop_timeout = Duration::from_millis(100);
    let (rt, rec) = runtime(cfg);
    let mut events = rt.subscribe();

    let b = Recording::<()>::new().hanging_retire();
    let task = Task::on_reload(&rt, b, TaskOptions::named("stuck").with_immediately(false))
        .await
        .unwrap();

    let err = task.stop().await.unwrap_err();
    assert!(matches!(err, TaskError::StopTimeout { .. }));
    assert!(task.died());
    assert!(rec.aborts.lock().is_empty());

    let mut timed_out = false;
    while let Ok(ev) = events.try_recv() {
        timed_out |= ev.kind == EventKind::TaskStopTimeout;
    }
    assert!(timed_out);
}

#[tokio::test]
async fn test_tcp_task_accepts_connections() {
    let (rt, _rec) = runtime(quiet_config());
    let b = Recording::<TcpStream>::new();
    let (stats, seen) = (b.stats.clone(), b.seen.clone());

    let task = Task::on_tcp(&rt, b, "127.0.0.1:0", TaskOptions::named("tcp"))
        .await
        .unwrap();
    assert_eq!(task.kind(), TaskKind::OnTcp);
    let addr = task.local_addr().unwrap();

    for _ in 0..2 {
        let mut conn = TcpStream::connect(addr).await.unwrap();
        conn.write_all(b"ping").await.unwrap();
    }
    assert!(eventually(|| stats.schedules() == 2).await);
    assert_eq!(seen.lock().len(), 2);

    task.stop().await.unwrap();
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_tcp_bind_failure_is_terminal() {
    let (rt, rec) = runtime(quiet_config());
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = taken.local_addr().unwrap();

    let b = Recording::<TcpStream>::new();
    let stats = b.stats.clone();
    let err = Task::on_tcp(&rt, b, addr.to_string(), TaskOptions::named("tcp"))
        .await
        .err()
        .unwrap();

    assert!(matches!(err, TaskError::Bind { .. }));
    assert_eq!(stats.retires(), 1);
    assert!(rec.aborts.lock().is_empty());
    assert!(rt.orchestrator().retire_keys().is_empty());
}

#[cfg(feature = "fs-watch")]
#[tokio::test]
async fn test_fs_change_task_sees_writes() {
    let (rt, _rec) = runtime(quiet_config());
    let dir = tempfile::tempdir().unwrap();
    let b = Recording::<notify::Event>::new();
    let (stats, seen) = (b.stats.clone(), b.seen.clone());

    let task = Task::on_fs_change(&rt, b, dir.path(), TaskOptions::named("fs"))
        .await
        .unwrap();

    std::fs::write(dir.path().join("data.txt"), "hello").unwrap();
    assert!(eventually(|| stats.schedules() >= 1).await);
    assert!(
        seen.lock()
            .iter()
            .any(|ev| ev.paths.iter().any(|p| p.ends_with("data.txt")))
    );

    task.stop().await.unwrap();
}

#[cfg(feature = "fs-watch")]
#[tokio::test]
async fn test_fs_watch_failure_is_terminal() {
    let (rt, _rec) = runtime(quiet_config());
    let dir = tempfile::tempdir().unwrap();
    let b = Recording::<notify::Event>::new();

    let err = Task::on_fs_change(&rt, b, dir.path().join("missing"), TaskOptions::named("fs"))
        .await
        .err()
        .unwrap();
    assert_eq!(err.as_label(), "task_watch");
}

#[tokio::test]
async fn test_reload_and_fire_do_not_run_value_tasks() {
    let (rt, _rec) = runtime(quiet_config());

    let b = Recording::<u32>::new();
    let (chan_stats, seen) = (b.stats.clone(), b.seen.clone());
    let (tx, rx) = mpsc::channel(8);
    let chan = Task::on_channel(&rt, b, rx, TaskOptions::named("chan"))
        .await
        .unwrap();

    let b = Recording::<TcpStream>::new();
    let tcp_stats = b.stats.clone();
    let tcp = Task::on_tcp(&rt, b, "127.0.0.1:0", TaskOptions::named("tcp"))
        .await
        .unwrap();

    tx.send(1).await.unwrap();
    tx.send(2).await.unwrap();
    assert!(eventually(|| chan_stats.schedules() == 2).await);

    rt.reload().await.unwrap();
    chan.fire().await.unwrap();
    tcp.fire().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(chan_stats.reloads(), 2);
    assert_eq!(tcp_stats.reloads(), 2);
    assert_eq!(chan_stats.schedules(), 2);
    assert_eq!(tcp_stats.schedules(), 0);
    assert_eq!(*seen.lock(), vec![1, 2]);

    tx.send(3).await.unwrap();
    assert!(eventually(|| chan_stats.schedules() == 3).await);
    assert_eq!(*seen.lock(), vec![1, 2, 3]);

    chan.stop().await.unwrap();
    tcp.stop().await.unwrap();
}

/// Records how long each `schedule` call lived, even when it is dropped mid-way.
struct Slow {
    starts: Arc<AtomicUsize>,
    lifetimes: Arc<Mutex<Vec<Duration>>>,
}

struct Lifetime {
    started: Instant,
    out: Arc<Mutex<Vec<Duration>>>,
}

impl Drop for Lifetime {
    fn drop(&mut self) {
        self.out.lock().push(self.started.elapsed());
    }
}

#[async_trait]
impl Tasker for Slow {
    type Arg = ();

    async fn schedule(&self, _ctx: &TaskContext, _arg: Option<()>) -> Result<(), TaskError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        let _lifetime = Lifetime {
            started: Instant::now(),
            out: Arc::clone(&self.lifetimes),
        };
        tokio::time::sleep(Duration::from_secs(10)).await;
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_slow_schedule_never_outlives_its_period() {
    let (rt, _rec) = runtime(quiet_config());
    let mut events = rt.subscribe();
    let starts = Arc::new(AtomicUsize::new(0));
    let lifetimes = Arc::new(Mutex::new(Vec::new()));
    let slow = Slow {
        starts: Arc::clone(&starts),
        lifetimes: Arc::clone(&lifetimes),
    };

    let task = Task::on_interval(
        &rt,
        slow,
        Duration::from_millis(100),
        TaskOptions::named("slow").with_immediately(false),
    )
    .await
    .unwrap();

    // Each cycle is one period of waiting plus at most one period of work.
    tokio::time::sleep(Duration::from_millis(1000)).await;
    let n = starts.load(Ordering::SeqCst);
    assert!((4..=6).contains(&n), "schedule started {n} times");
    assert!(!task.died());

    task.stop().await.unwrap();
    let lifetimes = lifetimes.lock().clone();
    assert!(lifetimes.len() >= 4);
    assert!(
        lifetimes.iter().all(|d| *d <= Duration::from_millis(100)),
        "schedule overran its period: {lifetimes:?}"
    );

    let mut timeouts = 0;
    while let Ok(ev) = events.try_recv() {
        if ev.kind == EventKind::ScheduleFailed {
            timeouts += 1;
        }
    }
    assert!(timeouts >= 4);
}

#[tokio::test]
async fn test_huge_interval_period_runs_and_stops() {
    let (rt, _rec) = runtime(quiet_config());
    let b = Recording::<()>::new();
    let stats = b.stats.clone();

    let task = Task::on_interval(
        &rt,
        b,
        Duration::from_secs(u64::MAX / 2),
        TaskOptions::named("rare").with_immediately(false),
    )
    .await
    .unwrap();

    assert!(eventually(|| rt.liveness().contains(task.key())).await);
    assert!(!task.died());

    task.stop().await.unwrap();
    assert_eq!(stats.retires(), 1);
    assert_eq!(stats.schedules(), 0);
    assert!(!rt.liveness().contains(task.key()));
    assert!(rt.orchestrator().retire_keys().is_empty());
}
