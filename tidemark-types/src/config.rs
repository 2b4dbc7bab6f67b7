//! Configuration types shared by the resource cache, scheduler and subscriber.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::TidemarkError;

/// How a single value is read at an instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Retrieval {
    /// Interpolate the value at the instant.
    #[default]
    Interpolated,
    /// Use the latest recorded value at or before the instant.
    Recorded,
}

/// How a time range is retrieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum RangeMode {
    /// Resample onto a fixed grid with the given spacing.
    Interpolated {
        /// Grid spacing.
        interval: Duration,
    },
    /// Return the natively stored values; `scan_rate` estimates the spacing
    /// between stored values for request sizing.
    Recorded {
        /// Expected time between recorded values.
        scan_rate: Duration,
    },
}

impl RangeMode {
    /// Default grid spacing for interpolated retrieval.
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);
    /// Default scan rate estimate for recorded retrieval.
    pub const DEFAULT_SCAN_RATE: Duration = Duration::from_secs(5);

    /// Interpolated mode with the default 60s grid.
    #[must_use]
    pub const fn interpolated() -> Self {
        Self::Interpolated {
            interval: Self::DEFAULT_INTERVAL,
        }
    }

    /// Recorded mode with the default 5s scan rate.
    #[must_use]
    pub const fn recorded() -> Self {
        Self::Recorded {
            scan_rate: Self::DEFAULT_SCAN_RATE,
        }
    }

    /// Per-row time quantum used to size requests.
    #[must_use]
    pub const fn step(&self) -> Duration {
        match self {
            Self::Interpolated { interval } => *interval,
            Self::Recorded { scan_rate } => *scan_rate,
        }
    }

    /// Point-in-time retrieval matching this range mode.
    #[must_use]
    pub const fn retrieval(&self) -> Retrieval {
        match self {
            Self::Interpolated { .. } => Retrieval::Interpolated,
            Self::Recorded { .. } => Retrieval::Recorded,
        }
    }

    /// Validate that the step is positive.
    ///
    /// # Errors
    /// Returns `InvalidArg` for a zero interval or scan rate.
    pub fn validate(&self) -> Result<(), TidemarkError> {
        if self.step().is_zero() {
            let what = match self {
                Self::Interpolated { .. } => "interval",
                Self::Recorded { .. } => "scan_rate",
            };
            return Err(TidemarkError::InvalidArg(format!("{what} must be positive")));
        }
        Ok(())
    }
}

impl Default for RangeMode {
    fn default() -> Self {
        Self::interpolated()
    }
}

/// Request sizing and fan-out limits for range retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeOptions {
    /// Upper bound on rows a single fetch is expected to return.
    pub max_rows_per_request: u32,
    /// Maximum concurrent fetches per partition.
    pub max_concurrency: usize,
}

impl Default for RangeOptions {
    fn default() -> Self {
        Self {
            max_rows_per_request: 5000,
            max_concurrency: 4,
        }
    }
}

impl RangeOptions {
    /// Validate limits.
    ///
    /// # Errors
    /// Returns `InvalidArg` if either limit is zero.
    pub fn validate(&self) -> Result<(), TidemarkError> {
        if self.max_rows_per_request == 0 {
            return Err(TidemarkError::InvalidArg(
                "max_rows_per_request must be positive".into(),
            ));
        }
        if self.max_concurrency == 0 {
            return Err(TidemarkError::InvalidArg(
                "max_concurrency must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Settings for a resource cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    /// Number of most-recent refreshes kept per column.
    pub retention: usize,
    /// IANA timezone rows are converted into; UTC when unset.
    pub timezone: Option<String>,
    /// Data server the resource's points live on, passed through to lookups.
    pub dataserver: Option<String>,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            retention: 15,
            timezone: None,
            dataserver: None,
        }
    }
}

/// Settings for the periodic refresh scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Period between refresh starts.
    pub interval: Duration,
    /// Retrieval used by each refresh.
    pub retrieval: Retrieval,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            retrieval: Retrieval::Interpolated,
        }
    }
}

/// Settings for push subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriberConfig {
    /// Capacity of the shared message buffer.
    pub buffer_capacity: usize,
    /// Request header budget used to split sources across connections.
    pub max_header_bytes: usize,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 200,
            max_header_bytes: 4096,
        }
    }
}
