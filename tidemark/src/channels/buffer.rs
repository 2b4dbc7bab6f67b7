use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tidemark_core::TidemarkError;
use tokio::sync::Notify;

struct State<T> {
    queue: VecDeque<T>,
    closed: bool,
    get_in_progress: bool,
}

/// Bounded many-producer / single-consumer buffer with explicit close.
///
/// `put` waits for space and `get` waits for data; both return
/// [`TidemarkError::Closed`] once the buffer is closed, except that `get`
/// keeps draining messages enqueued before the close.
pub struct MessageBuffer<T> {
    capacity: usize,
    state: Mutex<State<T>>,
    space_available: Notify,
    data_available: Notify,
}

impl<T> MessageBuffer<T> {
    /// Create an empty buffer.
    ///
    /// # Errors
    /// Returns `InvalidArg` for a zero capacity.
    pub fn new(capacity: usize) -> Result<Self, TidemarkError> {
        if capacity == 0 {
            return Err(TidemarkError::InvalidArg(
                "buffer capacity must be at least 1".into(),
            ));
        }
        Ok(Self {
            capacity,
            state: Mutex::new(State {
                queue: VecDeque::with_capacity(capacity),
                closed: false,
                get_in_progress: false,
            }),
            space_available: Notify::new(),
            data_available: Notify::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue `item`, waiting while the buffer is full.
    ///
    /// # Errors
    /// Returns `Closed` if the buffer is or becomes closed; the item is dropped.
    pub async fn put(&self, item: T) -> Result<(), TidemarkError> {
        loop {
            let notified = self.space_available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut state = self.lock();
                if state.closed {
                    return Err(TidemarkError::Closed);
                }
                if state.queue.len() < self.capacity {
                    state.queue.push_back(item);
                    drop(state);
                    self.data_available.notify_one();
                    return Ok(());
                }
            }
            notified.await;
        }
    }

    /// Dequeue the oldest item, waiting up to `timeout` (forever when `None`).
    ///
    /// # Errors
    /// - `Closed` once the buffer is closed and drained.
    /// - `Timeout` when `timeout` elapses first.
    /// - `Usage` if another `get` is already waiting.
    pub async fn get(&self, timeout: Option<Duration>) -> Result<T, TidemarkError> {
        {
            let mut state = self.lock();
            if state.get_in_progress {
                return Err(TidemarkError::usage("concurrent get on message buffer"));
            }
            if let Some(item) = state.queue.pop_front() {
                drop(state);
                self.space_available.notify_one();
                return Ok(item);
            }
            if state.closed {
                return Err(TidemarkError::Closed);
            }
            state.get_in_progress = true;
        }
        let _guard = GetGuard(self);

        let deadline = timeout.map(|t| tokio::time::Instant::now() + t);
        loop {
            let notified = self.data_available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut state = self.lock();
                if let Some(item) = state.queue.pop_front() {
                    drop(state);
                    self.space_available.notify_one();
                    return Ok(item);
                }
                if state.closed {
                    return Err(TidemarkError::Closed);
                }
            }
            match (deadline, timeout) {
                (Some(at), Some(after)) => {
                    if tokio::time::timeout_at(at, notified).await.is_err() {
                        return Err(TidemarkError::timeout("message buffer get", after));
                    }
                }
                _ => notified.await,
            }
        }
    }

    /// Close the buffer and wake every waiter. Idempotent.
    pub fn close(&self) {
        self.lock().closed = true;
        self.space_available.notify_waiters();
        self.data_available.notify_waiters();
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of queued items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }

    /// Maximum number of queued items.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Clears the in-progress flag even when a `get` future is dropped mid-wait.
struct GetGuard<'a, T>(&'a MessageBuffer<T>);

impl<T> Drop for GetGuard<'_, T> {
    fn drop(&mut self) {
        self.0.lock().get_in_progress = false;
    }
}
