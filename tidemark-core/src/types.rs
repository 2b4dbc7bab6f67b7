//! Data model shared by the range, alignment and streaming layers.

use core::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::TidemarkError;

/// Opaque historian identifier for one time-series point.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    /// Wrap a raw identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SourceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A scalar reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Boolean state.
    Bool(bool),
    /// Integer reading.
    Int(i64),
    /// Floating point reading.
    Float(f64),
    /// Text, including digital state names.
    Text(String),
}

impl Value {
    /// Numeric view of the value, if it has one.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Bool(_) | Self::Text(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// Validity flag reported with every sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Quality {
    /// The reading is usable.
    #[default]
    Good,
    /// The reading is bad and maps to "no value".
    Bad,
}

/// One timestamped reading from the historian.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Instant of the reading.
    pub ts: DateTime<Utc>,
    /// Raw value, if any.
    pub value: Option<Value>,
    /// Validity of the reading.
    pub quality: Quality,
}

impl Sample {
    /// A good sample.
    pub fn good(ts: DateTime<Utc>, value: impl Into<Value>) -> Self {
        Self {
            ts,
            value: Some(value.into()),
            quality: Quality::Good,
        }
    }

    /// A bad sample carrying no usable value.
    #[must_use]
    pub const fn bad(ts: DateTime<Utc>) -> Self {
        Self {
            ts,
            value: None,
            quality: Quality::Bad,
        }
    }

    /// The usable value: `None` for bad quality or a missing value.
    #[must_use]
    pub fn reading(&self) -> Option<&Value> {
        match self.quality {
            Quality::Good => self.value.as_ref(),
            Quality::Bad => None,
        }
    }

    /// Consume the sample into `(timestamp, usable value)`.
    #[must_use]
    pub fn into_reading(self) -> (DateTime<Utc>, Option<Value>) {
        match self.quality {
            Quality::Good => (self.ts, self.value),
            Quality::Bad => (self.ts, None),
        }
    }
}

/// A time interval with `start < end`; both ends inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TimeRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeRange {
    /// Build a range.
    ///
    /// # Errors
    /// Returns `InvalidArg` unless `start < end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, TidemarkError> {
        if start >= end {
            return Err(TidemarkError::InvalidArg(format!(
                "time range start {start} must be before end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Range ending at `end` and reaching `lookback` into the past.
    ///
    /// # Errors
    /// Returns `InvalidArg` if `lookback` is not positive.
    pub fn ending_at(end: DateTime<Utc>, lookback: TimeDelta) -> Result<Self, TidemarkError> {
        let start = end
            .checked_sub_signed(lookback)
            .ok_or_else(|| TidemarkError::InvalidArg("lookback out of range".into()))?;
        Self::new(start, end)
    }

    /// Inclusive start.
    #[must_use]
    pub const fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Inclusive end.
    #[must_use]
    pub const fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Length of the range.
    #[must_use]
    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }

    /// Whether `ts` lies within `[start, end]`.
    #[must_use]
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts <= self.end
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// One aligned row: a timestamp and one optional value per column.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Row instant in the resource's timezone.
    pub timestamp: DateTime<Tz>,
    /// Column values in header order; `None` is "no value".
    pub values: Vec<Option<Value>>,
}

impl Row {
    /// Build a row.
    #[must_use]
    pub const fn new(timestamp: DateTime<Tz>, values: Vec<Option<Value>>) -> Self {
        Self { timestamp, values }
    }

    /// Row with every column set to "no value".
    #[must_use]
    pub fn empty(timestamp: DateTime<Tz>, width: usize) -> Self {
        Self {
            timestamp,
            values: vec![None; width],
        }
    }

    /// Value at column `idx`, if present.
    #[must_use]
    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx).and_then(Option::as_ref)
    }

    /// Row instant in UTC.
    #[must_use]
    pub fn utc(&self) -> DateTime<Utc> {
        self.timestamp.with_timezone(&Utc)
    }
}

/// Outcome of resolving point names to source ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Names that resolved to exactly one source, in resolution order.
    pub mapped: Vec<(String, SourceId)>,
    /// Names that did not resolve.
    pub unmapped: Vec<String>,
}

/// Truncate an instant to whole seconds.
#[must_use]
pub fn truncate_to_second(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(ts.timestamp(), 0).unwrap_or(ts)
}
