use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::Stream;
use futures::future::select_all;
use tidemark_core::{
    ChannelMessage, Closable, MessageDecoder, PushConnection, SubscriberConfig, Teardown,
    TidemarkError,
};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};

use super::buffer::MessageBuffer;

/// Lifecycle of a subscription as seen by its consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Running; nothing consumed yet.
    Open,
    /// At least one message has been requested.
    Consuming,
    /// Drained after a clean shutdown.
    ClosedOk,
    /// Drained and the terminal connection error has been handed out.
    ClosedError,
}

type Failure = Arc<Mutex<Option<TidemarkError>>>;
type Buffer = Arc<MessageBuffer<ChannelMessage>>;
type Signal = Arc<watch::Sender<bool>>;

impl<T> Closable for MessageBuffer<T> {
    fn close(&self) {
        Self::close(self);
    }
}

/// Fan-in of several push connections into one bounded, ordered buffer.
///
/// One consumer task per connection decodes frames and pushes them into the
/// shared buffer; a supervisor waits for the first consumer to end and then
/// tears everything down. A connection failure is reported after the backlog
/// has been drained.
pub struct Subscriber {
    buffer: Buffer,
    failure: Failure,
    teardown: Teardown<Signal, Buffer, JoinHandle<()>>,
    state: SubscriptionState,
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("state", &self.state)
            .field("buffered", &self.buffer.len())
            .finish_non_exhaustive()
    }
}

impl Subscriber {
    /// Start consuming `connections`.
    ///
    /// # Errors
    /// - `InvalidArg` for no connections or a zero buffer capacity.
    /// - `Usage` when called outside a Tokio runtime.
    pub fn spawn(
        connections: Vec<Box<dyn PushConnection>>,
        decoder: Arc<dyn MessageDecoder>,
        config: SubscriberConfig,
    ) -> Result<Self, TidemarkError> {
        if connections.is_empty() {
            return Err(TidemarkError::InvalidArg(
                "a subscription needs at least one connection".into(),
            ));
        }
        let buffer: Buffer = Arc::new(MessageBuffer::new(config.buffer_capacity)?);
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| TidemarkError::usage("subscriber requires a Tokio runtime"))?;
        let failure: Failure = Arc::new(Mutex::new(None));
        let signal: Signal = Arc::new(watch::channel(false).0);

        let consumers = connections
            .into_iter()
            .enumerate()
            .map(|(index, conn)| {
                runtime.spawn(consume(
                    index,
                    conn,
                    Arc::clone(&decoder),
                    Arc::clone(&buffer),
                    signal.subscribe(),
                ))
            })
            .collect();

        let supervisor = runtime.spawn(supervise(
            consumers,
            Arc::clone(&signal),
            Arc::clone(&buffer),
            Arc::clone(&failure),
        ));

        Ok(Self {
            teardown: Teardown::new(signal, Arc::clone(&buffer), supervisor),
            buffer,
            failure,
            state: SubscriptionState::Open,
        })
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> SubscriptionState {
        self.state
    }

    /// Next message, waiting as long as needed.
    ///
    /// Returns `None` once the subscription is closed and drained. If a
    /// connection failed, its error is returned once before `None`.
    pub async fn next(&mut self) -> Option<Result<ChannelMessage, TidemarkError>> {
        self.next_inner(None).await
    }

    /// Like [`next`](Self::next) but gives up after `timeout` with a
    /// `Timeout` error; the subscription stays usable.
    pub async fn next_timeout(
        &mut self,
        timeout: Duration,
    ) -> Option<Result<ChannelMessage, TidemarkError>> {
        self.next_inner(Some(timeout)).await
    }

    async fn next_inner(
        &mut self,
        timeout: Option<Duration>,
    ) -> Option<Result<ChannelMessage, TidemarkError>> {
        match self.state {
            SubscriptionState::ClosedOk | SubscriptionState::ClosedError => return None,
            SubscriptionState::Open => self.state = SubscriptionState::Consuming,
            SubscriptionState::Consuming => {}
        }
        match self.buffer.get(timeout).await {
            Ok(msg) => Some(Ok(msg)),
            Err(TidemarkError::Closed) => {
                let failure = self
                    .failure
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
                if let Some(e) = failure {
                    self.state = SubscriptionState::ClosedError;
                    Some(Err(e))
                } else {
                    self.state = SubscriptionState::ClosedOk;
                    None
                }
            }
            Err(e) => Some(Err(e)),
        }
    }

    /// Close every connection and wait for the supervisor to finish.
    ///
    /// Messages already buffered are still returned by [`next`](Self::next).
    pub async fn close(&mut self) {
        if let Some(supervisor) = self.teardown.shutdown() {
            let _ = supervisor.await;
        }
        self.buffer.close();
    }

    /// Number of messages waiting in the buffer.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Adapt into a [`Stream`] that ends after the terminal item.
    pub fn into_stream(self) -> impl Stream<Item = Result<ChannelMessage, TidemarkError>> + Send {
        futures::stream::unfold(self, |mut sub| async move {
            let item = sub.next().await?;
            Some((item, sub))
        })
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.teardown.release();
    }
}

async fn consume(
    index: usize,
    mut conn: Box<dyn PushConnection>,
    decoder: Arc<dyn MessageDecoder>,
    buffer: Buffer,
    mut teardown: watch::Receiver<bool>,
) -> Result<(), TidemarkError> {
    let outcome = loop {
        let frame = tokio::select! {
            biased;
            _ = teardown.changed() => break Ok(()),
            read = conn.read_message() => read,
        };
        let bytes = match frame {
            Ok(Some(bytes)) => bytes,
            Ok(None) => break Ok(()),
            Err(e) if !e.is_terminal() => {
                #[cfg(feature = "tracing")]
                tracing::warn!(connection = index, error = %e, "skipping failed channel read");
                #[cfg(not(feature = "tracing"))]
                let _ = e;
                continue;
            }
            Err(e) => break Err(e),
        };
        let msg = match decoder.decode(&bytes) {
            Ok(msg) => msg.sorted(),
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(connection = index, error = %e, "dropping undecodable channel frame");
                #[cfg(not(feature = "tracing"))]
                let _ = (index, e);
                continue;
            }
        };
        let put = tokio::select! {
            biased;
            _ = teardown.changed() => break Ok(()),
            put = buffer.put(msg) => put,
        };
        if put.is_err() {
            break Ok(());
        }
    };
    conn.close().await;
    outcome
}

async fn supervise(
    consumers: Vec<JoinHandle<Result<(), TidemarkError>>>,
    signal: Signal,
    buffer: Buffer,
    failure: Failure,
) {
    let mut stop = signal.subscribe();
    let mut first = select_all(consumers);
    let finished = tokio::select! {
        out = &mut first => Some(out),
        _ = stop.wait_for(|stop| *stop) => None,
    };
    let remaining = match finished {
        Some((outcome, _index, rest)) => {
            record(&failure, outcome);
            rest
        }
        None => first.into_inner(),
    };

    signal.close();
    buffer.close();
    for consumer in remaining {
        record(&failure, consumer.await);
    }
}

fn record(failure: &Failure, outcome: Result<Result<(), TidemarkError>, JoinError>) {
    let err = match outcome {
        Ok(Ok(())) => return,
        Ok(Err(e)) => e,
        Err(join) if join.is_cancelled() => return,
        Err(_) => TidemarkError::Connection("connection consumer panicked".into()),
    };
    #[cfg(feature = "tracing")]
    tracing::warn!(error = %err, "subscription connection failed");
    let mut slot = failure.lock().unwrap_or_else(PoisonError::into_inner);
    if slot.is_none() {
        *slot = Some(err);
    }
}
