use core::fmt;
use serde::{Deserialize, Serialize};

/// Collaborator capabilities a historian connector may advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Capability {
    /// Resolve point names to source ids.
    PointLookup,
    /// Fetch a time range of samples for one source.
    RangeFetch,
    /// Fetch a single sample at an instant.
    PointFetch,
    /// Open push connections for a set of sources.
    Channels,
}

impl Capability {
    /// Stable, kebab-case identifier for logs/errors.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PointLookup => "point-lookup",
            Self::RangeFetch => "range-fetch",
            Self::PointFetch => "point-fetch",
            Self::Channels => "channels",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
