use std::collections::{BTreeSet, VecDeque};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::TidemarkError;
use crate::types::{Row, Sample, Value};

/// Timestamped readings for one column, consumed front-first during alignment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointSeries {
    points: VecDeque<(DateTime<Utc>, Option<Value>)>,
}

impl PointSeries {
    /// Empty column; aligns to "no value" everywhere.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from samples already sorted strictly ascending.
    ///
    /// Bad-quality samples become "no value".
    ///
    /// # Errors
    /// Returns `Data` if timestamps are not strictly ascending.
    pub fn from_sorted(samples: Vec<Sample>) -> Result<Self, TidemarkError> {
        if let Some(w) = samples.windows(2).find(|w| w[0].ts >= w[1].ts) {
            return Err(TidemarkError::Data(format!(
                "samples not strictly ascending at {} -> {}",
                w[0].ts, w[1].ts
            )));
        }
        Ok(Self {
            points: samples.into_iter().map(Sample::into_reading).collect(),
        })
    }

    /// Build from samples in any order.
    ///
    /// Samples are sorted by timestamp; for duplicate timestamps the first one
    /// delivered wins.
    #[must_use]
    pub fn from_unsorted(mut samples: Vec<Sample>) -> Self {
        samples.sort_by_key(|s| s.ts);
        samples.dedup_by_key(|s| s.ts);
        Self {
            points: samples.into_iter().map(Sample::into_reading).collect(),
        }
    }

    /// Number of readings left.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether every reading has been consumed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Timestamps still held, in order.
    pub fn timestamps(&self) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        self.points.iter().map(|(ts, _)| *ts)
    }

    fn take_at(&mut self, ts: DateTime<Utc>) -> Option<Value> {
        match self.points.front() {
            Some((front, _)) if *front == ts => self.points.pop_front().and_then(|(_, v)| v),
            _ => None,
        }
    }
}

/// Sorted, de-duplicated union of every column's timestamps.
pub fn timestamp_index<'a, I>(columns: I) -> Vec<DateTime<Utc>>
where
    I: IntoIterator<Item = &'a PointSeries>,
{
    let mut set = BTreeSet::new();
    for col in columns {
        set.extend(col.timestamps());
    }
    set.into_iter().collect()
}

/// Lazily yields one [`Row`] per index timestamp, draining the columns.
///
/// The aligner is single-pass: once a row is produced the readings behind it
/// are gone.
#[derive(Debug)]
pub struct RowAligner {
    index: std::vec::IntoIter<DateTime<Utc>>,
    columns: Vec<PointSeries>,
    tz: Tz,
}

impl RowAligner {
    /// Align `columns` over a caller-supplied `index`.
    ///
    /// Row timestamps are converted into `tz` (UTC when `None`); values are
    /// untouched.
    ///
    /// # Errors
    /// Returns `Data` if the index is not strictly ascending or a column holds
    /// a timestamp the index does not contain.
    pub fn new(
        index: Vec<DateTime<Utc>>,
        columns: Vec<PointSeries>,
        tz: Option<Tz>,
    ) -> Result<Self, TidemarkError> {
        if let Some(w) = index.windows(2).find(|w| w[0] >= w[1]) {
            return Err(TidemarkError::Data(format!(
                "timestamp index not strictly ascending at {} -> {}",
                w[0], w[1]
            )));
        }
        for (pos, col) in columns.iter().enumerate() {
            let mut prev: Option<DateTime<Utc>> = None;
            for ts in col.timestamps() {
                if prev.is_some_and(|p| p >= ts) {
                    return Err(TidemarkError::Data(format!(
                        "column {pos} not strictly ascending at {ts}"
                    )));
                }
                if index.binary_search(&ts).is_err() {
                    return Err(TidemarkError::Data(format!(
                        "column {pos} holds {ts} which is missing from the index"
                    )));
                }
                prev = Some(ts);
            }
        }
        Ok(Self::new_unchecked(index, columns, tz))
    }

    /// Build the index from the columns themselves and align over it.
    #[must_use]
    pub fn from_columns(columns: Vec<PointSeries>, tz: Option<Tz>) -> Self {
        let index = timestamp_index(&columns);
        Self::new_unchecked(index, columns, tz)
    }

    fn new_unchecked(index: Vec<DateTime<Utc>>, columns: Vec<PointSeries>, tz: Option<Tz>) -> Self {
        Self {
            index: index.into_iter(),
            columns,
            tz: tz.unwrap_or(Tz::UTC),
        }
    }

    /// Number of columns per row.
    #[must_use]
    pub fn width(&self) -> usize {
        self.columns.len()
    }
}

impl Iterator for RowAligner {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        let ts = self.index.next()?;
        let values = self.columns.iter_mut().map(|c| c.take_at(ts)).collect();
        Some(Row::new(ts.with_timezone(&self.tz), values))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.index.size_hint()
    }
}

impl ExactSizeIterator for RowAligner {}
