use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Capability;

/// Unified error type for the tidemark workspace.
///
/// Covers configuration and usage mistakes, lookup failures, transient
/// collaborator failures and the terminal errors of a push subscription.
#[derive(Debug, Error, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TidemarkError {
    /// The connector does not implement a collaborator capability.
    #[error("unsupported capability: {capability}")]
    Unsupported {
        /// Capability label (e.g. "point-lookup").
        capability: String,
    },

    /// Invalid configuration or argument.
    #[error("invalid argument: {0}")]
    InvalidArg(String),

    /// Malformed input handed to a pure component (e.g. unsorted samples).
    #[error("data issue: {0}")]
    Data(String),

    /// A named item could not be found.
    #[error("not found: {what}")]
    NotFound {
        /// Description of the missing item, e.g. "data item 'temp'".
        what: String,
    },

    /// The point lookup could not map one or more names to source ids.
    #[error("unresolved points: {names:?}")]
    Unresolved {
        /// Names that did not resolve to exactly one source id.
        names: Vec<String>,
    },

    /// A collaborator call failed.
    #[error("{connector} failed: {msg}")]
    Connector {
        /// Connector name that failed.
        connector: String,
        /// Human-readable error message.
        msg: String,
    },

    /// A push connection failed; terminal for the owning subscription.
    #[error("connection failed: {0}")]
    Connection(String),

    /// A single channel frame could not be decoded.
    #[error("decode failed: {0}")]
    Decode(String),

    /// The buffer or subscription has been closed and drained.
    #[error("closed")]
    Closed,

    /// A blocking wait exceeded its timeout.
    #[error("timed out after {ms}ms: {what}")]
    Timeout {
        /// Operation that timed out.
        what: String,
        /// Timeout in milliseconds.
        ms: u64,
    },

    /// API misuse, e.g. a concurrent `get` or restarting a stopped scheduler.
    #[error("usage error: {0}")]
    Usage(String),

    /// Unknown/opaque error.
    #[error("unknown error: {0}")]
    Other(String),
}

impl TidemarkError {
    /// Helper: build an `Unsupported` error for a capability.
    #[must_use]
    pub fn unsupported(cap: Capability) -> Self {
        Self::Unsupported {
            capability: cap.to_string(),
        }
    }

    /// Helper: build a `Connector` error with the connector name and message.
    #[must_use]
    pub fn connector(connector: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Connector {
            connector: connector.into(),
            msg: msg.into(),
        }
    }

    /// Helper: build a `NotFound` error for a description of the missing item.
    #[must_use]
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Helper: build a `Usage` error.
    #[must_use]
    pub fn usage(msg: impl Into<String>) -> Self {
        Self::Usage(msg.into())
    }

    /// Helper: build a `Timeout` error from a duration.
    #[must_use]
    pub fn timeout(what: impl Into<String>, after: std::time::Duration) -> Self {
        Self::Timeout {
            what: what.into(),
            ms: u64::try_from(after.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Returns true for errors that end a subscription or call for good.
    ///
    /// Transient collaborator failures and single-frame decode failures are
    /// retried next cycle or skipped; everything else is terminal.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Connector { .. } | Self::Decode(_) | Self::Timeout { .. })
    }
}
