use chrono::DateTime;
use tidemark_core::{RingBuffer, Row, TidemarkError, Tz, Value};

/// Name of the reserved history column holding refresh timestamps.
pub const TIMESTAMP_COLUMN: &str = "timestamp";

/// Snapshot of one history column, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryColumn {
    /// The reserved `timestamp` column.
    Timestamps(Vec<DateTime<Tz>>),
    /// A data item column.
    Values(Vec<Option<Value>>),
}

impl HistoryColumn {
    /// Number of retained entries.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Timestamps(v) => v.len(),
            Self::Values(v) => v.len(),
        }
    }

    /// Whether the column holds nothing yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The values, unless this is the timestamp column.
    #[must_use]
    pub fn values(&self) -> Option<&[Option<Value>]> {
        match self {
            Self::Values(v) => Some(v),
            Self::Timestamps(_) => None,
        }
    }

    /// The timestamps, if this is the timestamp column.
    #[must_use]
    pub fn timestamps(&self) -> Option<&[DateTime<Tz>]> {
        match self {
            Self::Timestamps(v) => Some(v),
            Self::Values(_) => None,
        }
    }
}

#[derive(Debug)]
pub(crate) struct HistoryCache {
    timestamps: RingBuffer<DateTime<Tz>>,
    columns: Vec<(String, RingBuffer<Option<Value>>)>,
}

impl HistoryCache {
    pub(crate) fn new<'a>(
        names: impl IntoIterator<Item = &'a str>,
        retention: usize,
    ) -> Result<Self, TidemarkError> {
        let columns = names
            .into_iter()
            .map(|n| Ok((n.to_string(), RingBuffer::new(retention)?)))
            .collect::<Result<Vec<_>, TidemarkError>>()?;
        Ok(Self {
            timestamps: RingBuffer::new(retention)?,
            columns,
        })
    }

    /// Append one row whose values are in declaration order.
    pub(crate) fn append(&mut self, row: &Row) {
        self.timestamps.push(row.timestamp);
        for ((_, ring), value) in self.columns.iter_mut().zip(&row.values) {
            ring.push(value.clone());
        }
    }

    pub(crate) fn column(&self, name: &str) -> Option<HistoryColumn> {
        if name == TIMESTAMP_COLUMN {
            return Some(HistoryColumn::Timestamps(self.timestamps.to_vec()));
        }
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, ring)| HistoryColumn::Values(ring.to_vec()))
    }

    pub(crate) fn len(&self) -> usize {
        self.timestamps.len()
    }
}
