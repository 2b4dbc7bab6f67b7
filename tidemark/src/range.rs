//! Partitioned, aligned range retrieval.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use tidemark_core::connector::{point_fetch, range_fetch};
use tidemark_core::{
    HistorianConnector, PointSeries, RangeMode, RangeOptions, Row, RowAligner, SourceId,
    TidemarkError, TimeRange, Tz, Value, partition_for,
};

use crate::resource::ColumnLayout;

/// Rows of a range query in strictly ascending timestamp order.
pub type RowStream = BoxStream<'static, Row>;

/// Drops rows that do not advance time.
#[derive(Debug, Default)]
struct MonotonicGate {
    last: Option<DateTime<Utc>>,
}

impl MonotonicGate {
    fn allow(&mut self, ts: DateTime<Utc>) -> bool {
        match self.last {
            Some(prev) if ts <= prev => false,
            _ => {
                self.last = Some(ts);
                true
            }
        }
    }
}

pub(crate) struct RangePlan {
    connector: Arc<dyn HistorianConnector>,
    layout: Arc<ColumnLayout>,
    sources: Arc<[SourceId]>,
    parts: VecDeque<TimeRange>,
    mode: RangeMode,
    options: RangeOptions,
    tz: Tz,
    gate: MonotonicGate,
}

impl RangePlan {
    pub(crate) fn new(
        connector: Arc<dyn HistorianConnector>,
        layout: Arc<ColumnLayout>,
        range: TimeRange,
        mode: RangeMode,
        options: RangeOptions,
        tz: Option<Tz>,
    ) -> Result<Self, TidemarkError> {
        mode.validate()?;
        options.validate()?;
        let sources: Arc<[SourceId]> = layout.sources().into();
        if !sources.is_empty() {
            range_fetch(&*connector)?;
        }
        if matches!(mode, RangeMode::Recorded { .. }) && !sources.is_empty() {
            point_fetch(&*connector)?;
        }
        let parts = partition_for(&range, &mode, options.max_rows_per_request)?;
        Ok(Self {
            connector,
            layout,
            sources,
            parts: parts.into(),
            mode,
            options,
            tz: tz.unwrap_or(Tz::UTC),
            gate: MonotonicGate::default(),
        })
    }

    pub(crate) fn into_stream(self) -> RowStream {
        stream::unfold(self, |mut plan| async move {
            let rows = plan.next_partition().await?;
            Some((rows, plan))
        })
        .flat_map(stream::iter)
        .boxed()
    }

    fn recorded(&self) -> bool {
        matches!(self.mode, RangeMode::Recorded { .. })
    }

    /// Rows for the next partition.
    ///
    /// In recorded mode each partition opens with a probe at its start and the
    /// last partition closes with a probe at the range end; fetched rows on a
    /// partition boundary are dropped in favour of the probes. In interpolated
    /// mode a boundary row belongs to the partition that starts there.
    async fn next_partition(&mut self) -> Option<Vec<Row>> {
        let part = self.parts.pop_front()?;
        let is_last = self.parts.is_empty();
        let recorded = self.recorded();

        let mut rows = Vec::new();
        if recorded {
            rows.push(self.probe(part.start()).await);
        }
        let columns = self.fetch_columns(part).await;
        for row in RowAligner::from_columns(columns, Some(self.tz)) {
            let ts = row.utc();
            let on_start = ts == part.start();
            let on_end = ts == part.end();
            if recorded && (on_start || on_end) {
                continue;
            }
            if !recorded && on_end && !is_last {
                continue;
            }
            rows.push(Row::new(row.timestamp, self.layout.arrange(row.values)));
        }
        if recorded && is_last {
            rows.push(self.probe(part.end()).await);
        }

        let gate = &mut self.gate;
        rows.retain(|r| {
            let keep = gate.allow(r.utc());
            #[cfg(feature = "tracing")]
            if !keep {
                tracing::debug!(ts = %r.timestamp, "dropping row that does not advance time");
            }
            keep
        });
        Some(rows)
    }

    async fn fetch_columns(&self, part: TimeRange) -> Vec<PointSeries> {
        let mode = self.mode;
        stream::iter(self.sources.iter().cloned())
            .map(|source| {
                let connector = Arc::clone(&self.connector);
                async move {
                    let fetched = match range_fetch(&*connector) {
                        Ok(f) => f.fetch(&source, part, mode).await,
                        Err(e) => Err(e),
                    };
                    match fetched {
                        Ok(mut samples) => {
                            samples.retain(|s| part.contains(s.ts));
                            PointSeries::from_unsorted(samples)
                        }
                        Err(e) => {
                            #[cfg(feature = "tracing")]
                            tracing::warn!(source = %source, range = %part, error = %e, "range fetch failed");
                            #[cfg(not(feature = "tracing"))]
                            let _ = e;
                            PointSeries::empty()
                        }
                    }
                }
            })
            .buffered(self.options.max_concurrency)
            .collect()
            .await
    }

    async fn probe(&self, at: DateTime<Utc>) -> Row {
        let retrieval = self.mode.retrieval();
        let values: Vec<Option<Value>> = stream::iter(self.sources.iter().cloned())
            .map(|source| {
                let connector = Arc::clone(&self.connector);
                async move {
                    let fetched = match point_fetch(&*connector) {
                        Ok(f) => f.fetch_at(&source, at, retrieval).await,
                        Err(e) => Err(e),
                    };
                    match fetched {
                        Ok(sample) => sample.and_then(|s| s.reading().cloned()),
                        Err(e) => {
                            #[cfg(feature = "tracing")]
                            tracing::warn!(source = %source, at = %at, error = %e, "boundary probe failed");
                            #[cfg(not(feature = "tracing"))]
                            let _ = e;
                            None
                        }
                    }
                }
            })
            .buffered(self.options.max_concurrency)
            .collect()
            .await;
        Row::new(at.with_timezone(&self.tz), self.layout.arrange(values))
    }
}
