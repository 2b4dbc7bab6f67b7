use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::json;
use tidemark_core::{ChannelItem, PushConnection, TidemarkError};
use tokio::sync::mpsc;

/// What a mock push connection delivers next.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// A raw frame.
    Frame(Vec<u8>),
    /// Fail the read with this error.
    Fail(TidemarkError),
    /// End the stream cleanly.
    Eof,
}

/// Push connection fed from a [`crate::MockController`].
pub struct MockConnection {
    rx: mpsc::UnboundedReceiver<ChannelEvent>,
    closed: Arc<AtomicBool>,
}

impl MockConnection {
    pub(crate) const fn new(
        rx: mpsc::UnboundedReceiver<ChannelEvent>,
        closed: Arc<AtomicBool>,
    ) -> Self {
        Self { rx, closed }
    }
}

#[async_trait]
impl PushConnection for MockConnection {
    async fn read_message(&mut self) -> Result<Option<Vec<u8>>, TidemarkError> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(None);
        }
        match self.rx.recv().await {
            Some(ChannelEvent::Frame(bytes)) => Ok(Some(bytes)),
            Some(ChannelEvent::Fail(e)) => Err(e),
            Some(ChannelEvent::Eof) | None => Ok(None),
        }
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        self.rx.close();
    }
}

/// Push connection replaying a fixed script.
///
/// After the script it reports end of stream, or blocks forever when built
/// with [`then_hang`](Self::then_hang).
pub struct ScriptedConnection {
    events: VecDeque<ChannelEvent>,
    hang: bool,
    closed: Arc<AtomicBool>,
}

impl ScriptedConnection {
    /// Replay `events`, then end the stream.
    pub fn new(events: impl IntoIterator<Item = ChannelEvent>) -> Self {
        Self {
            events: events.into_iter().collect(),
            hang: false,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Block after the script instead of ending.
    #[must_use]
    pub const fn then_hang(mut self) -> Self {
        self.hang = true;
        self
    }

    /// Flag set once the connection is closed.
    #[must_use]
    pub fn close_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }
}

#[async_trait]
impl PushConnection for ScriptedConnection {
    async fn read_message(&mut self) -> Result<Option<Vec<u8>>, TidemarkError> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(None);
        }
        match self.events.pop_front() {
            Some(ChannelEvent::Frame(bytes)) => Ok(Some(bytes)),
            Some(ChannelEvent::Fail(e)) => Err(e),
            Some(ChannelEvent::Eof) => Ok(None),
            None if self.hang => std::future::pending().await,
            None => Ok(None),
        }
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Encode `items` as a JSON channel frame.
#[must_use]
pub fn encode_frame(items: &[ChannelItem]) -> Vec<u8> {
    let items: Vec<serde_json::Value> = items
        .iter()
        .map(|item| {
            let samples: Vec<serde_json::Value> = item
                .samples
                .iter()
                .map(|s| {
                    json!({
                        "Timestamp": s.ts.to_rfc3339(),
                        "Value": s.value,
                        "Good": s.reading().is_some(),
                    })
                })
                .collect();
            json!({
                "Name": item.name,
                "WebId": item.source.as_str(),
                "Items": samples,
            })
        })
        .collect();
    json!({ "Items": items }).to_string().into_bytes()
}
