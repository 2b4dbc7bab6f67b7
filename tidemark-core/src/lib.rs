//! tidemark-core
//!
//! Core types, collaborator traits, and time-series utilities shared across
//! the tidemark historian engine.
//!
//! - `types`: time ranges, samples, values and aligned rows.
//! - `connector`: the `HistorianConnector` trait and its collaborator role traits.
//! - `timeseries`: range partitioning, row alignment and bounded history.
//! - `channel`: decoded push-channel messages and frame decoders.
//!
//! Async runtime (Tokio)
//! ---------------------
//! Collaborator traits are `async_trait` based and the subscription teardown
//! in `teardown` operates on `tokio::task::JoinHandle` and
//! `tokio::sync::watch`. Code using them must run under a Tokio 1.x runtime.
#![warn(missing_docs)]

/// Decoded push-channel messages and decoders.
pub mod channel;
/// Collaborator role traits and the primary `HistorianConnector` interface.
pub mod connector;
/// Partitioning, alignment and history buffers.
pub mod timeseries;
pub mod teardown;
pub mod types;

pub use channel::{ChannelItem, ChannelMessage, JsonFrameDecoder, MessageDecoder};
pub use connector::{
    ChannelProvider, HistorianConnector, PointFetch, PointLookup, PushConnection, RangeFetch,
};
pub use timeseries::align::{PointSeries, RowAligner, timestamp_index};
pub use timeseries::partition::{
    partition, partition_for, partition_on_interval, partition_on_scan_rate,
};
pub use teardown::{Closable, Supervisor, Teardown};
pub use timeseries::ring::RingBuffer;
pub use types::*;

pub use tidemark_types::{
    Capability, RangeMode, RangeOptions, ResourceConfig, Retrieval, SchedulerConfig,
    SubscriberConfig, TidemarkError,
};
pub use chrono_tz::Tz;
