//! Shutdown bookkeeping for a multiplexed subscription.
//!
//! A subscription is torn down from two places: its supervisor, once the
//! first connection consumer ends, and its owner, on `close` or drop. Both
//! paths go through the same [`Closable`] parts, so either may run first.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// A part of a subscription that stops accepting work when closed.
///
/// `close` must be idempotent and safe to call from several tasks.
pub trait Closable {
    /// Close this part.
    fn close(&self);
}

impl<T: Closable + ?Sized> Closable for Arc<T> {
    fn close(&self) {
        (**self).close();
    }
}

/// The teardown signal watched by connection consumers.
impl Closable for watch::Sender<bool> {
    fn close(&self) {
        self.send_replace(true);
    }
}

/// The supervisor task of a subscription.
pub trait Supervisor {
    /// Whether the supervisor has already returned.
    fn is_finished(&self) -> bool;
    /// Cancel the supervisor.
    fn abort(&self);
}

impl<T> Supervisor for JoinHandle<T> {
    fn is_finished(&self) -> bool {
        JoinHandle::is_finished(self)
    }

    fn abort(&self) {
        JoinHandle::abort(self);
    }
}

/// Owns the consumer signal, the message buffer and the supervisor of one
/// subscription, and shuts them down at most once.
pub struct Teardown<S, B, H> {
    signal: S,
    buffer: B,
    supervisor: Option<H>,
}

impl<S, B, H> Teardown<S, B, H>
where
    S: Closable,
    B: Closable,
    H: Supervisor,
{
    /// Track a freshly spawned subscription.
    pub fn new(signal: S, buffer: B, supervisor: H) -> Self {
        Self {
            signal,
            buffer,
            supervisor: Some(supervisor),
        }
    }

    /// Whether [`shutdown`](Self::shutdown) or [`release`](Self::release)
    /// already ran.
    #[must_use]
    pub const fn is_released(&self) -> bool {
        self.supervisor.is_none()
    }

    /// Signal the consumers and hand back the supervisor so the caller can
    /// wait for connections to close. The buffer is left to the supervisor.
    ///
    /// Returns `None` if the subscription was already released.
    pub fn shutdown(&mut self) -> Option<H> {
        let supervisor = self.supervisor.take()?;
        self.signal.close();
        Some(supervisor)
    }

    /// Tear down without waiting: signal the consumers, close the buffer and
    /// abort the supervisor if it is still running.
    ///
    /// Consumers close their own connections once signalled. Messages already
    /// buffered stay readable. Returns `true` if a running supervisor was
    /// aborted.
    pub fn release(&mut self) -> bool {
        let Some(supervisor) = self.supervisor.take() else {
            return false;
        };
        self.signal.close();
        self.buffer.close();
        if supervisor.is_finished() {
            false
        } else {
            supervisor.abort();
            true
        }
    }
}
