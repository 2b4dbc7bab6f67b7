use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tidemark_core::TidemarkError;
use tokio::sync::watch;

use crate::resource::ResourceCache;

/// Identifier of a registered task, unique for the lifetime of a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskHandle(pub(crate) u64);

impl TaskHandle {
    /// Numeric id; handles are assigned from 0 upwards.
    #[must_use]
    pub const fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Pointer identity of a shared task object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskIdentity(usize);

impl TaskIdentity {
    /// Identity of the object behind `task`, regardless of how it was coerced.
    #[must_use]
    pub fn of<T: ?Sized>(task: &Arc<T>) -> Self {
        Self(Arc::as_ptr(task).cast::<()>() as usize)
    }
}

/// Unit of work dispatched after every successful refresh.
#[async_trait]
pub trait Task: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Run once. Long-running work should watch
    /// [`TaskContext::is_shutting_down`] to exit promptly. The context is
    /// only usable until this returns.
    async fn run(&self, ctx: &TaskContext) -> Result<(), TidemarkError>;

    /// Identity of the underlying task when this one only binds arguments to it.
    fn bound_target(&self) -> Option<TaskIdentity> {
        None
    }
}

/// A task that takes arguments; register it through [`Bound`].
#[async_trait]
pub trait BindableTask<A>: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Run once with `args`.
    async fn run_with(&self, ctx: &TaskContext, args: &A) -> Result<(), TidemarkError>;
}

/// A [`BindableTask`] with its arguments fixed.
pub struct Bound<A> {
    target: Arc<dyn BindableTask<A>>,
    args: A,
}

impl<A> Bound<A> {
    /// Bind `args` to `target`.
    pub fn new(target: Arc<dyn BindableTask<A>>, args: A) -> Self {
        Self { target, args }
    }

    /// The bound arguments.
    pub const fn args(&self) -> &A {
        &self.args
    }
}

#[async_trait]
impl<A: Send + Sync + 'static> Task for Bound<A> {
    fn name(&self) -> &str {
        self.target.name()
    }

    async fn run(&self, ctx: &TaskContext) -> Result<(), TidemarkError> {
        self.target.run_with(ctx, &self.args).await
    }

    fn bound_target(&self) -> Option<TaskIdentity> {
        Some(TaskIdentity::of(&self.target))
    }
}

/// A task backed by an async closure.
pub struct FnTask<F> {
    name: String,
    f: F,
}

impl<F, Fut> FnTask<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TidemarkError>> + Send + 'static,
{
    /// Wrap `f` as a task named `name`.
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<F, Fut> Task for FnTask<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TidemarkError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &TaskContext) -> Result<(), TidemarkError> {
        (self.f)(ctx.clone()).await
    }
}

/// What a task run can see: its handle, the scheduled resource and the
/// scheduler's shutdown signal. Only the scheduler creates one.
///
/// Clones share the run's lifetime: once the run returns, `resource`,
/// `is_shutting_down` and `wait_for_shutdown` fail with `Usage`.
#[derive(Clone)]
pub struct TaskContext {
    handle: TaskHandle,
    resource: Arc<ResourceCache>,
    shutdown: watch::Receiver<bool>,
    active: Arc<AtomicBool>,
}

impl fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("handle", &self.handle)
            .field("resource", &self.resource.id())
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

impl TaskContext {
    pub(crate) fn new(
        handle: TaskHandle,
        resource: Arc<ResourceCache>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            handle,
            resource,
            shutdown,
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Mark the run as finished for this context and every clone of it.
    pub(crate) fn finish(&self) {
        self.active.store(false, Ordering::Release);
    }

    fn ensure_active(&self) -> Result<(), TidemarkError> {
        if self.is_active() {
            Ok(())
        } else {
            Err(TidemarkError::usage(format!(
                "task context for {} used outside its run",
                self.handle
            )))
        }
    }

    /// Handle of the task this context was created for.
    #[must_use]
    pub const fn handle(&self) -> TaskHandle {
        self.handle
    }

    /// Whether the run this context belongs to is still executing.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// The resource the scheduler refreshes.
    ///
    /// # Errors
    /// Returns `Usage` once the run has ended.
    pub fn resource(&self) -> Result<&Arc<ResourceCache>, TidemarkError> {
        self.ensure_active()?;
        Ok(&self.resource)
    }

    /// Whether the scheduler has been asked to stop.
    ///
    /// # Errors
    /// Returns `Usage` once the run has ended.
    pub fn is_shutting_down(&self) -> Result<bool, TidemarkError> {
        self.ensure_active()?;
        Ok(*self.shutdown.borrow())
    }

    /// Wait until shutdown is requested or `timeout` passes.
    ///
    /// Returns `true` if shutdown was requested.
    ///
    /// # Errors
    /// Returns `Usage` once the run has ended.
    pub async fn wait_for_shutdown(&self, timeout: Option<Duration>) -> Result<bool, TidemarkError> {
        self.ensure_active()?;
        let mut rx = self.shutdown.clone();
        // A dropped scheduler counts as shutdown.
        let wait = async move {
            let _ = rx.wait_for(|stop| *stop).await;
            true
        };
        Ok(match timeout {
            Some(limit) => tokio::time::timeout(limit, wait).await.unwrap_or(false),
            None => wait.await,
        })
    }
}
