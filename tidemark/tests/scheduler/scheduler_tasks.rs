use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tidemark::{
    BindableTask, Bound, FnTask, Scheduler, Task, TaskContext, TaskIdentity, TidemarkError,
};
use tokio::time::sleep;

use crate::helpers::*;

struct Report {
    runs: AtomicUsize,
}

#[async_trait]
impl BindableTask<String> for Report {
    fn name(&self) -> &str {
        "report"
    }

    async fn run_with(&self, ctx: &TaskContext, args: &String) -> Result<(), TidemarkError> {
        assert!(!args.is_empty());
        assert!(ctx.handle().id() < 10);
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn handles_count_up_from_zero() {
    let (res, _ctl) = live_resource().await;
    let scheduler = Scheduler::builder(res).build().unwrap();
    let counter = Arc::new(AtomicUsize::new(0));

    let a = scheduler.add_task(counting_task("a", &counter));
    let b = scheduler.add_task(counting_task("b", &counter));
    assert_eq!((a.id(), b.id()), (0, 1));
    assert_eq!(a.to_string(), "task#0");

    assert!(scheduler.remove_task(a).is_some());
    assert!(scheduler.remove_task(a).is_none());
    let c = scheduler.add_task(counting_task("c", &counter));
    assert_eq!(c.id(), 2);
    assert_eq!(scheduler.task_count(), 2);
}

#[tokio::test]
async fn find_matches_identity_and_optionally_bindings() {
    let (res, _ctl) = live_resource().await;
    let scheduler = Scheduler::builder(res).build().unwrap();

    let report = Arc::new(Report {
        runs: AtomicUsize::new(0),
    });
    let target: Arc<dyn BindableTask<String>> = report.clone();
    let daily = scheduler.add_task(Arc::new(Bound::new(Arc::clone(&target), "daily".to_string())));
    let weekly = scheduler.add_task(Arc::new(Bound::new(target, "weekly".to_string())));

    let plain: Arc<dyn Task> = Arc::new(FnTask::new("noop", |_ctx| async {
        Ok::<(), TidemarkError>(())
    }));
    let noop = scheduler.add_task(Arc::clone(&plain));

    let report_id = TaskIdentity::of(&report);
    assert!(scheduler.find_task_handles(report_id, false).is_empty());
    assert_eq!(scheduler.find_task_handles(report_id, true), vec![daily, weekly]);
    assert_eq!(scheduler.find_task_handles(TaskIdentity::of(&plain), false), vec![noop]);
    assert_eq!(scheduler.find_task_handles(TaskIdentity::of(&plain), true), vec![noop]);
}

#[tokio::test(start_paused = true)]
async fn bound_tasks_run_with_their_arguments() {
    let (res, _ctl) = live_resource().await;
    let scheduler = Scheduler::builder(res)
        .interval(Duration::from_secs(10))
        .build()
        .unwrap();
    let report = Arc::new(Report {
        runs: AtomicUsize::new(0),
    });
    let target: Arc<dyn BindableTask<String>> = report.clone();
    scheduler.add_task(Arc::new(Bound::new(target, "hourly".to_string())));

    scheduler.start().unwrap();
    sleep(Duration::from_secs(15)).await;
    scheduler.stop().await;
    assert_eq!(report.runs.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn removing_a_running_task_lets_it_finish() {
    let (res, _ctl) = live_resource().await;
    let scheduler = Scheduler::builder(res)
        .interval(Duration::from_secs(10))
        .build()
        .unwrap();
    let started = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicUsize::new(0));
    let (s, f) = (Arc::clone(&started), Arc::clone(&finished));
    let handle = scheduler.add_task(Arc::new(FnTask::new("slow", move |_ctx| {
        let (s, f) = (Arc::clone(&s), Arc::clone(&f));
        async move {
            s.fetch_add(1, Ordering::SeqCst);
            sleep(Duration::from_secs(15)).await;
            f.fetch_add(1, Ordering::SeqCst);
            Ok::<(), TidemarkError>(())
        }
    })));

    scheduler.start().unwrap();
    sleep(Duration::from_secs(5)).await;
    assert!(scheduler.is_task_running(handle));
    assert!(scheduler.remove_task(handle).is_some());

    sleep(Duration::from_secs(30)).await;
    assert_eq!(started.load(Ordering::SeqCst), 1);
    assert_eq!(finished.load(Ordering::SeqCst), 1);
    assert!(!scheduler.is_task_running(handle));
    scheduler.stop().await;
}
