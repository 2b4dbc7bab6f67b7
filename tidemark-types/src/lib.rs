//! Error and configuration primitives shared across the tidemark workspace.
#![warn(missing_docs)]

mod capability;
mod config;
mod error;

pub use capability::Capability;
pub use config::{
    RangeMode, RangeOptions, ResourceConfig, Retrieval, SchedulerConfig, SubscriberConfig,
};
pub use error::TidemarkError;
