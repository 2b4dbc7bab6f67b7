use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tidemark::{FnTask, Scheduler, TidemarkError};
use tokio::time::sleep;

use crate::helpers::*;

const INTERVAL: Duration = Duration::from_secs(10);

#[tokio::test(start_paused = true)]
async fn every_task_runs_once_per_refresh() {
    let (res, _ctl) = live_resource().await;
    let scheduler = Scheduler::builder(Arc::clone(&res))
        .interval(INTERVAL)
        .build()
        .unwrap();
    let counters: Vec<Arc<AtomicUsize>> = (0..3).map(|_| Arc::new(AtomicUsize::new(0))).collect();
    for (i, c) in counters.iter().enumerate() {
        scheduler.add_task(counting_task(&format!("count-{i}"), c));
    }

    scheduler.start().unwrap();
    // refreshes at 0s, 10s, 20s and 30s
    sleep(Duration::from_secs(35)).await;
    scheduler.stop().await;

    for c in &counters {
        assert_eq!(c.load(Ordering::SeqCst), 4);
    }
    assert_eq!(res.history_len(), 4);
}

#[tokio::test(start_paused = true)]
async fn slow_task_never_overlaps_itself() {
    let (res, _ctl) = live_resource().await;
    let scheduler = Scheduler::builder(res).interval(INTERVAL).build().unwrap();

    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let started = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicUsize::new(0));
    let task = {
        let (active, peak, started, finished) = (
            Arc::clone(&active),
            Arc::clone(&peak),
            Arc::clone(&started),
            Arc::clone(&finished),
        );
        FnTask::new("slow", move |_ctx| {
            let (active, peak, started, finished) = (
                Arc::clone(&active),
                Arc::clone(&peak),
                Arc::clone(&started),
                Arc::clone(&finished),
            );
            async move {
                started.fetch_add(1, Ordering::SeqCst);
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                sleep(Duration::from_secs(25)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                finished.fetch_add(1, Ordering::SeqCst);
                Ok::<(), TidemarkError>(())
            }
        })
    };
    scheduler.add_task(Arc::new(task));

    scheduler.start().unwrap();
    // runs start at 0s and 30s; refreshes at 10s and 20s find it busy
    sleep(Duration::from_secs(50)).await;
    assert_eq!(started.load(Ordering::SeqCst), 2);
    assert_eq!(finished.load(Ordering::SeqCst), 1);

    // stop waits for the run still in flight
    scheduler.stop().await;
    assert_eq!(finished.load(Ordering::SeqCst), 2);
    assert_eq!(peak.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_refresh_skips_dispatch() {
    let (res, ctl) = live_resource().await;
    ctl.fail_source("S1").await;
    let scheduler = Scheduler::builder(Arc::clone(&res))
        .interval(INTERVAL)
        .build()
        .unwrap();
    let runs = Arc::new(AtomicUsize::new(0));
    scheduler.add_task(counting_task("count", &runs));

    scheduler.start().unwrap();
    sleep(Duration::from_secs(25)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert_eq!(res.history_len(), 0);

    ctl.clear_failure("S1").await;
    sleep(Duration::from_secs(10)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(scheduler.is_running());
    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn failing_tasks_do_not_affect_others() {
    let (res, _ctl) = live_resource().await;
    let scheduler = Scheduler::builder(res).interval(INTERVAL).build().unwrap();

    let failures = Arc::new(AtomicUsize::new(0));
    let ok_runs = Arc::new(AtomicUsize::new(0));
    let f = Arc::clone(&failures);
    scheduler.add_task(Arc::new(FnTask::new("fails", move |_ctx| {
        let f = Arc::clone(&f);
        async move {
            f.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(TidemarkError::Other("boom".into()))
        }
    })));
    scheduler.add_task(Arc::new(FnTask::new("panics", |_ctx| async {
        if true {
            panic!("task panicked on purpose");
        }
        Ok::<(), TidemarkError>(())
    })));
    scheduler.add_task(counting_task("ok", &ok_runs));

    scheduler.start().unwrap();
    sleep(Duration::from_secs(25)).await;
    scheduler.stop().await;

    assert_eq!(failures.load(Ordering::SeqCst), 3);
    assert_eq!(ok_runs.load(Ordering::SeqCst), 3);
}
