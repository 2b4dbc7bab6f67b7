//! Push subscriptions: the bounded message buffer, the connection
//! multiplexer and helpers to open subscriptions against a connector.

mod buffer;
mod subscriber;

use std::sync::Arc;

use tidemark_core::connector::{channel_provider, point_lookup};
use tidemark_core::{
    HistorianConnector, JsonFrameDecoder, MessageDecoder, PushConnection, SourceId,
    SubscriberConfig, TidemarkError,
};

pub use buffer::MessageBuffer;
pub use subscriber::{SubscriptionState, Subscriber};

use crate::resource::ResourceCache;

const SOURCE_SEPARATOR: &str = "&webId=";

/// Connections needed so each request's source list stays under `max_header_bytes`.
#[must_use]
pub fn connection_count(sources: &[SourceId], max_header_bytes: usize) -> usize {
    if sources.is_empty() {
        return 0;
    }
    let joined: usize = sources.iter().map(|s| s.as_str().len()).sum::<usize>()
        + SOURCE_SEPARATOR.len() * (sources.len() - 1);
    joined / max_header_bytes.max(1) + 1
}

/// Split `sources` into at most `connections` batches of `ceil(n / connections)`.
#[must_use]
pub fn batch_sources(sources: &[SourceId], connections: usize) -> Vec<Vec<SourceId>> {
    if sources.is_empty() || connections == 0 {
        return Vec::new();
    }
    let per = sources.len().div_ceil(connections);
    sources.chunks(per).map(<[SourceId]>::to_vec).collect()
}

/// Resolve `names` and subscribe to every one of them.
///
/// # Errors
/// Returns `Unresolved` listing every name the lookup could not map, plus any
/// error from [`subscribe_sources`].
pub async fn subscribe(
    connector: &dyn HistorianConnector,
    names: &[String],
    dataserver: Option<&str>,
    config: SubscriberConfig,
) -> Result<Subscriber, TidemarkError> {
    let upper: Vec<String> = names.iter().map(|n| n.to_uppercase()).collect();
    let resolution = point_lookup(connector)?.resolve(&upper, dataserver).await?;
    if !resolution.unmapped.is_empty() {
        return Err(TidemarkError::Unresolved {
            names: resolution.unmapped,
        });
    }
    let sources: Vec<SourceId> = resolution.mapped.into_iter().map(|(_, s)| s).collect();
    subscribe_sources(connector, &sources, config).await
}

/// Open enough connections for `sources` and multiplex them.
///
/// # Errors
/// Returns `InvalidArg` for an empty source list, `Unsupported` without a
/// channel provider, or the first error from opening a connection (already
/// opened connections are closed).
pub async fn subscribe_sources(
    connector: &dyn HistorianConnector,
    sources: &[SourceId],
    config: SubscriberConfig,
) -> Result<Subscriber, TidemarkError> {
    if sources.is_empty() {
        return Err(TidemarkError::InvalidArg("no sources to subscribe to".into()));
    }
    let provider = channel_provider(connector)?;
    let batches = batch_sources(sources, connection_count(sources, config.max_header_bytes));

    let mut connections: Vec<Box<dyn PushConnection>> = Vec::with_capacity(batches.len());
    for batch in &batches {
        match provider.open_channel(batch).await {
            Ok(conn) => connections.push(conn),
            Err(e) => {
                for mut conn in connections {
                    conn.close().await;
                }
                return Err(e);
            }
        }
    }

    #[cfg(feature = "tracing")]
    tracing::debug!(
        connector = connector.name(),
        sources = sources.len(),
        connections = connections.len(),
        "opened subscription"
    );

    let decoder: Arc<dyn MessageDecoder> = Arc::new(JsonFrameDecoder);
    Subscriber::spawn(connections, decoder, config)
}

impl ResourceCache {
    /// Subscribe to every resolved column of this resource.
    ///
    /// # Errors
    /// See [`subscribe_sources`].
    pub async fn subscribe(&self, config: SubscriberConfig) -> Result<Subscriber, TidemarkError> {
        subscribe_sources(&**self.connector(), &self.sources(), config).await
    }
}
