use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::TidemarkError;
use crate::types::{Resolution, Sample, SourceId, TimeRange};
use tidemark_types::{Capability, RangeMode, Retrieval};

/// Role trait for connectors that map point names to source ids.
#[async_trait]
pub trait PointLookup: Send + Sync {
    /// Resolve `names` on the given data server (connector default when `None`).
    ///
    /// A name is mapped only if it matches exactly one point; everything else
    /// lands in `unmapped`. Implementations must be idempotent and free of side
    /// effects visible to the caller.
    async fn resolve(
        &self,
        names: &[String],
        dataserver: Option<&str>,
    ) -> Result<Resolution, TidemarkError>;
}

/// Role trait for connectors that serve ranged history for one source.
#[async_trait]
pub trait RangeFetch: Send + Sync {
    /// Fetch samples in `range` (inclusive) using `mode`.
    ///
    /// Samples should be sorted ascending; callers sort defensively.
    async fn fetch(
        &self,
        source: &SourceId,
        range: TimeRange,
        mode: RangeMode,
    ) -> Result<Vec<Sample>, TidemarkError>;
}

/// Role trait for connectors that serve single readings at an instant.
#[async_trait]
pub trait PointFetch: Send + Sync {
    /// Fetch the reading for `source` at `at`, or `None` when the historian has none.
    async fn fetch_at(
        &self,
        source: &SourceId,
        at: DateTime<Utc>,
        retrieval: Retrieval,
    ) -> Result<Option<Sample>, TidemarkError>;
}

/// A framed, already-upgraded push connection.
#[async_trait]
pub trait PushConnection: Send {
    /// Read the next frame; `Ok(None)` signals a clean end of stream.
    async fn read_message(&mut self) -> Result<Option<Vec<u8>>, TidemarkError>;

    /// Close the connection. Must be safe to call more than once.
    async fn close(&mut self);
}

/// Role trait for connectors that open push channels.
#[async_trait]
pub trait ChannelProvider: Send + Sync {
    /// Open one push connection delivering updates for `sources`.
    async fn open_channel(
        &self,
        sources: &[SourceId],
    ) -> Result<Box<dyn PushConnection>, TidemarkError>;
}

/// A historian connector advertising its collaborator capabilities.
pub trait HistorianConnector: Send + Sync {
    /// A stable identifier used in logs and errors.
    fn name(&self) -> &'static str;

    /// Advertise point lookup capability.
    fn as_point_lookup(&self) -> Option<&dyn PointLookup> {
        None
    }

    /// Advertise ranged fetch capability.
    fn as_range_fetch(&self) -> Option<&dyn RangeFetch> {
        None
    }

    /// Advertise point-in-time fetch capability.
    fn as_point_fetch(&self) -> Option<&dyn PointFetch> {
        None
    }

    /// Advertise push channel capability.
    fn as_channel_provider(&self) -> Option<&dyn ChannelProvider> {
        None
    }
}

/// Borrow the point lookup of `conn` or fail with `Unsupported`.
///
/// # Errors
/// Returns `Unsupported` when the connector lacks the capability.
pub fn point_lookup(conn: &dyn HistorianConnector) -> Result<&dyn PointLookup, TidemarkError> {
    conn.as_point_lookup()
        .ok_or_else(|| TidemarkError::unsupported(Capability::PointLookup))
}

/// Borrow the range fetch of `conn` or fail with `Unsupported`.
///
/// # Errors
/// Returns `Unsupported` when the connector lacks the capability.
pub fn range_fetch(conn: &dyn HistorianConnector) -> Result<&dyn RangeFetch, TidemarkError> {
    conn.as_range_fetch()
        .ok_or_else(|| TidemarkError::unsupported(Capability::RangeFetch))
}

/// Borrow the point fetch of `conn` or fail with `Unsupported`.
///
/// # Errors
/// Returns `Unsupported` when the connector lacks the capability.
pub fn point_fetch(conn: &dyn HistorianConnector) -> Result<&dyn PointFetch, TidemarkError> {
    conn.as_point_fetch()
        .ok_or_else(|| TidemarkError::unsupported(Capability::PointFetch))
}

/// Borrow the channel provider of `conn` or fail with `Unsupported`.
///
/// # Errors
/// Returns `Unsupported` when the connector lacks the capability.
pub fn channel_provider(
    conn: &dyn HistorianConnector,
) -> Result<&dyn ChannelProvider, TidemarkError> {
    conn.as_channel_provider()
        .ok_or_else(|| TidemarkError::unsupported(Capability::Channels))
}
