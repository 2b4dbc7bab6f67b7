//! Tidemark reads process-historian data as aligned, named rows.
//!
//! Overview
//! - [`ResourceCache`] binds named data items to historian points, reads the
//!   current row, streams ranged history and keeps a bounded history of refreshes.
//! - Range reads are split into request-sized partitions and aligned on a shared
//!   timestamp index, yielding rows in strictly ascending time order.
//! - [`Scheduler`] refreshes a resource on a fixed period and dispatches
//!   registered tasks after each successful refresh, never overlapping runs of
//!   the same task.
//! - [`Subscriber`] multiplexes one or more push connections into a bounded,
//!   ordered message stream.
//!
//! Collaborators (point lookup, ranged fetch, point-in-time fetch, push
//! channels) are supplied through a [`HistorianConnector`]; see
//! `tidemark-mock` for an in-memory implementation.
//!
//! Example
//! ```rust,ignore
//! use std::sync::Arc;
//! use tidemark::{ResourceCache, ResourceMapping, Retrieval, Scheduler};
//!
//! let mapping = ResourceMapping::new().bind("temp", "TAG1").unbound("setpoint");
//! let resource = Arc::new(
//!     ResourceCache::builder("boiler", connector)
//!         .mapping(mapping)
//!         .timezone("Europe/Oslo")
//!         .build()
//!         .await?,
//! );
//! let row = resource.current(Retrieval::Interpolated).await?;
//!
//! let scheduler = Scheduler::builder(Arc::clone(&resource))
//!     .interval(std::time::Duration::from_secs(30))
//!     .build()?;
//! scheduler.start()?;
//! ```
#![warn(missing_docs)]

/// Push subscriptions: buffer, multiplexer and connection batching.
pub mod channels;
/// Partitioned range reads.
pub mod range;
/// Resource caches and their mappings.
pub mod resource;
/// Periodic refresh and task dispatch.
pub mod scheduler;

pub use channels::{
    MessageBuffer, Subscriber, SubscriptionState, batch_sources, connection_count, subscribe,
    subscribe_sources,
};
pub use range::RowStream;
pub use resource::{
    DEFAULT_LOOKBACK, HistoryColumn, Meta, ResourceCache, ResourceCacheBuilder, ResourceMapping,
    TIMESTAMP_COLUMN,
};
pub use scheduler::{
    BindableTask, Bound, FnTask, Scheduler, SchedulerBuilder, Task, TaskContext, TaskHandle,
    TaskIdentity,
};

pub use tidemark_core::{
    Capability, ChannelItem, ChannelMessage, HistorianConnector, JsonFrameDecoder, MessageDecoder,
    PushConnection, Quality, RangeMode, RangeOptions, ResourceConfig, Retrieval, Row, Sample,
    SchedulerConfig, SourceId, SubscriberConfig, TidemarkError, TimeRange, Tz, Value,
};
