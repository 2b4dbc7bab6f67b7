//! Periodic refresh of a resource with task dispatch after each refresh.

mod task;

use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use futures::future::join_all;
use tidemark_core::{Retrieval, SchedulerConfig, TidemarkError};
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};

pub use task::{BindableTask, Bound, FnTask, Task, TaskContext, TaskHandle, TaskIdentity};

use crate::resource::ResourceCache;

/// Refreshes a [`ResourceCache`] on a fixed period and, after every
/// successful refresh, runs each registered task that is not still running.
///
/// The refresh period is measured from the start of the previous refresh.
/// A failed refresh is logged and skips dispatch for that cycle; a failed task
/// run is logged and affects nothing else.
pub struct Scheduler {
    shared: Arc<Shared>,
    lifecycle: Mutex<Lifecycle>,
}

struct Shared {
    resource: Arc<ResourceCache>,
    config: SchedulerConfig,
    table: Mutex<TaskTable>,
    shutdown_tx: watch::Sender<bool>,
    refreshed: Notify,
}

#[derive(Default)]
struct TaskTable {
    next_id: u64,
    tasks: BTreeMap<TaskHandle, Arc<dyn Task>>,
    running: HashMap<TaskHandle, JoinHandle<()>>,
}

enum Lifecycle {
    Idle,
    Running {
        refresh: JoinHandle<()>,
        dispatch: JoinHandle<()>,
    },
    Stopped,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("resource", &self.shared.resource.id())
            .field("config", &self.shared.config)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Scheduler`].
#[derive(Debug)]
pub struct SchedulerBuilder {
    resource: Arc<ResourceCache>,
    config: SchedulerConfig,
}

impl SchedulerBuilder {
    /// Period between refresh starts (default 60s).
    #[must_use]
    pub const fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    /// Retrieval used by every refresh.
    #[must_use]
    pub const fn retrieval(mut self, retrieval: Retrieval) -> Self {
        self.config.retrieval = retrieval;
        self
    }

    /// Replace the whole configuration.
    #[must_use]
    pub const fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Build an idle scheduler.
    ///
    /// # Errors
    /// Returns `InvalidArg` for a zero interval.
    pub fn build(self) -> Result<Scheduler, TidemarkError> {
        if self.config.interval.is_zero() {
            return Err(TidemarkError::InvalidArg(
                "refresh interval must be positive".into(),
            ));
        }
        let (shutdown_tx, _) = watch::channel(false);
        Ok(Scheduler {
            shared: Arc::new(Shared {
                resource: self.resource,
                config: self.config,
                table: Mutex::new(TaskTable::default()),
                shutdown_tx,
                refreshed: Notify::new(),
            }),
            lifecycle: Mutex::new(Lifecycle::Idle),
        })
    }
}

impl Scheduler {
    /// Start configuring a scheduler for `resource`.
    #[must_use]
    pub fn builder(resource: Arc<ResourceCache>) -> SchedulerBuilder {
        SchedulerBuilder {
            resource,
            config: SchedulerConfig::default(),
        }
    }

    /// The scheduled resource.
    #[must_use]
    pub fn resource(&self) -> &Arc<ResourceCache> {
        &self.shared.resource
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> SchedulerConfig {
        self.shared.config
    }

    /// Whether the refresh and dispatch loops are running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(
            *self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner),
            Lifecycle::Running { .. }
        )
    }

    /// Launch the refresh and dispatch loops. Starting twice is a no-op.
    ///
    /// # Errors
    /// Returns `Usage` after [`stop`](Self::stop) or outside a Tokio runtime.
    pub fn start(&self) -> Result<(), TidemarkError> {
        let mut lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        match *lifecycle {
            Lifecycle::Stopped => Err(TidemarkError::usage("scheduler cannot restart after stop")),
            Lifecycle::Running { .. } => Ok(()),
            Lifecycle::Idle => {
                let runtime = tokio::runtime::Handle::try_current()
                    .map_err(|_| TidemarkError::usage("scheduler requires a Tokio runtime"))?;
                let refresh = runtime.spawn(refresh_loop(
                    Arc::clone(&self.shared),
                    self.shared.shutdown_tx.subscribe(),
                ));
                let dispatch = runtime.spawn(dispatch_loop(
                    Arc::clone(&self.shared),
                    self.shared.shutdown_tx.subscribe(),
                ));
                *lifecycle = Lifecycle::Running { refresh, dispatch };
                Ok(())
            }
        }
    }

    /// Request shutdown, wait for both loops and every in-flight task run.
    ///
    /// Running tasks are not interrupted; they can observe the request through
    /// their [`TaskContext`]. Calling `stop` again is a no-op.
    pub async fn stop(&self) {
        let loops = {
            let mut lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
            match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
                Lifecycle::Running { refresh, dispatch } => Some((refresh, dispatch)),
                Lifecycle::Idle | Lifecycle::Stopped => None,
            }
        };
        self.shared.shutdown_tx.send_replace(true);
        self.shared.refreshed.notify_one();
        if let Some((refresh, dispatch)) = loops {
            let _ = refresh.await;
            let _ = dispatch.await;
        }
        let in_flight: Vec<JoinHandle<()>> = self
            .shared
            .table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .running
            .drain()
            .map(|(_, join)| join)
            .collect();
        join_all(in_flight).await;
    }

    /// Register `task` for dispatch after every successful refresh.
    pub fn add_task(&self, task: Arc<dyn Task>) -> TaskHandle {
        let mut table = self.shared.table.lock().unwrap_or_else(PoisonError::into_inner);
        let handle = TaskHandle(table.next_id);
        table.next_id += 1;
        table.tasks.insert(handle, task);
        handle
    }

    /// Unregister a task. A run already in flight is left to finish.
    pub fn remove_task(&self, handle: TaskHandle) -> Option<Arc<dyn Task>> {
        self.shared
            .table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .tasks
            .remove(&handle)
    }

    /// Handles of tasks registered as `identity`, in registration order.
    ///
    /// With `match_bound`, tasks that bind arguments to `identity` through
    /// [`Bound`] also match.
    #[must_use]
    pub fn find_task_handles(&self, identity: TaskIdentity, match_bound: bool) -> Vec<TaskHandle> {
        self.shared
            .table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .tasks
            .iter()
            .filter(|(_, task)| {
                TaskIdentity::of(*task) == identity
                    || (match_bound && task.bound_target() == Some(identity))
            })
            .map(|(handle, _)| *handle)
            .collect()
    }

    /// Number of registered tasks.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.shared
            .table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .tasks
            .len()
    }

    /// Whether a run of `handle` is currently in flight.
    #[must_use]
    pub fn is_task_running(&self, handle: TaskHandle) -> bool {
        self.shared
            .table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .running
            .contains_key(&handle)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shared.shutdown_tx.send_replace(true);
    }
}

async fn refresh_loop(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    let retrieval = shared.config.retrieval;
    loop {
        if *shutdown.borrow() {
            break;
        }
        let started = Instant::now();
        match shared.resource.refresh(retrieval).await {
            Ok(_) => shared.refreshed.notify_one(),
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(resource = %shared.resource.id(), error = %e, "refresh failed; skipping dispatch");
                #[cfg(not(feature = "tracing"))]
                let _ = e;
            }
        }
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            () = sleep_until(started + shared.config.interval) => {}
        }
    }
}

async fn dispatch_loop(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            () = shared.refreshed.notified() => {}
        }
        if *shutdown.borrow() {
            break;
        }
        dispatch_ready(&shared);
    }
}

fn dispatch_ready(shared: &Arc<Shared>) {
    let mut guard = shared.table.lock().unwrap_or_else(PoisonError::into_inner);
    let table = &mut *guard;
    let ready: Vec<(TaskHandle, Arc<dyn Task>)> = table
        .tasks
        .iter()
        .filter(|(handle, _)| !table.running.contains_key(handle))
        .map(|(handle, task)| (*handle, Arc::clone(task)))
        .collect();
    for (handle, task) in ready {
        #[cfg(feature = "tracing")]
        tracing::debug!(task = task.name(), handle = %handle, "dispatching task");
        let ctx = TaskContext::new(
            handle,
            Arc::clone(&shared.resource),
            shared.shutdown_tx.subscribe(),
        );
        let join = tokio::spawn(run_task(Arc::clone(shared), handle, task, ctx));
        table.running.insert(handle, join);
    }
}

async fn run_task(shared: Arc<Shared>, handle: TaskHandle, task: Arc<dyn Task>, ctx: TaskContext) {
    let outcome = AssertUnwindSafe(task.run(&ctx)).catch_unwind().await;
    ctx.finish();
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            #[cfg(feature = "tracing")]
            tracing::warn!(task = task.name(), handle = %handle, error = %e, "task run failed");
            #[cfg(not(feature = "tracing"))]
            let _ = e;
        }
        Err(_) => {
            #[cfg(feature = "tracing")]
            tracing::warn!(task = task.name(), handle = %handle, "task run panicked");
        }
    }
    shared
        .table
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .running
        .remove(&handle);
}
