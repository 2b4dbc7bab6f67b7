//! In-memory historian implementing every tidemark collaborator trait.
//!
//! Samples are served from fixtures registered on the builder; a
//! [`MockController`] injects failures and latency, records calls and drives
//! push channels from the outside.

mod channel;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tidemark_core::connector::{
    ChannelProvider, HistorianConnector, PointFetch, PointLookup, PushConnection, RangeFetch,
};
use tidemark_core::{
    Capability, RangeMode, Resolution, Retrieval, Sample, SourceId, TidemarkError, TimeRange,
    Value,
};
use tokio::sync::{Mutex, mpsc};

pub use channel::{ChannelEvent, MockConnection, ScriptedConnection, encode_frame};

const NAME: &str = "tidemark-mock";

#[derive(Default)]
struct State {
    failing: HashSet<SourceId>,
    lookup_failure: Option<TidemarkError>,
    open_failure: Option<TidemarkError>,
    delay: Option<Duration>,
    resolve_calls: usize,
    range_calls: Vec<(SourceId, TimeRange)>,
    probe_calls: Vec<(SourceId, DateTime<Utc>)>,
    in_flight: usize,
    max_in_flight: usize,
    channels: Vec<OpenChannel>,
}

struct OpenChannel {
    sources: Vec<SourceId>,
    tx: mpsc::UnboundedSender<ChannelEvent>,
    closed: Arc<AtomicBool>,
}

/// Builder for [`MockHistorian`].
#[derive(Default)]
pub struct MockHistorianBuilder {
    points: BTreeMap<String, Vec<SourceId>>,
    samples: HashMap<SourceId, Vec<Sample>>,
    disabled: HashSet<Capability>,
}

impl MockHistorianBuilder {
    /// Register point `name` backed by `source`.
    #[must_use]
    pub fn point(mut self, name: &str, source: impl Into<SourceId>) -> Self {
        self.points
            .entry(name.to_uppercase())
            .or_default()
            .push(source.into());
        self
    }

    /// Register `name` as matching several points, so lookups leave it unmapped.
    #[must_use]
    pub fn ambiguous(mut self, name: &str, sources: &[&str]) -> Self {
        self.points.insert(
            name.to_uppercase(),
            sources.iter().map(|s| SourceId::new(*s)).collect(),
        );
        self
    }

    /// Recorded samples for `source`, in any order.
    #[must_use]
    pub fn samples(mut self, source: impl Into<SourceId>, mut samples: Vec<Sample>) -> Self {
        samples.sort_by_key(|s| s.ts);
        self.samples.insert(source.into(), samples);
        self
    }

    /// Hide a capability from the connector.
    #[must_use]
    pub fn without(mut self, capability: Capability) -> Self {
        self.disabled.insert(capability);
        self
    }

    /// Build the historian and its controller.
    #[must_use]
    pub fn build(self) -> (Arc<MockHistorian>, MockController) {
        let state = Arc::new(Mutex::new(State::default()));
        let samples = Arc::new(Mutex::new(self.samples));
        let historian = Arc::new(MockHistorian {
            points: self.points,
            samples: Arc::clone(&samples),
            disabled: self.disabled,
            state: Arc::clone(&state),
        });
        (historian, MockController { state, samples })
    }
}

/// Deterministic in-memory historian.
pub struct MockHistorian {
    points: BTreeMap<String, Vec<SourceId>>,
    samples: Arc<Mutex<HashMap<SourceId, Vec<Sample>>>>,
    disabled: HashSet<Capability>,
    state: Arc<Mutex<State>>,
}

impl MockHistorian {
    /// Start building a historian.
    #[must_use]
    pub fn builder() -> MockHistorianBuilder {
        MockHistorianBuilder::default()
    }

    fn enabled(&self, capability: Capability) -> bool {
        !self.disabled.contains(&capability)
    }

    /// Record a call against `source`, apply latency and failure injection.
    async fn enter(&self, source: &SourceId) -> Result<(), TidemarkError> {
        let delay = {
            let mut st = self.state.lock().await;
            st.in_flight += 1;
            st.max_in_flight = st.max_in_flight.max(st.in_flight);
            st.delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut st = self.state.lock().await;
        st.in_flight -= 1;
        if st.failing.contains(source) {
            return Err(TidemarkError::connector(
                NAME,
                format!("forced failure for {source}"),
            ));
        }
        Ok(())
    }

    async fn series(&self, source: &SourceId) -> Vec<Sample> {
        self.samples
            .lock()
            .await
            .get(source)
            .cloned()
            .unwrap_or_default()
    }
}

/// Latest sample at or before `at`.
fn sample_at(samples: &[Sample], at: DateTime<Utc>) -> Option<&Sample> {
    let idx = samples.partition_point(|s| s.ts <= at);
    idx.checked_sub(1).map(|i| &samples[i])
}

/// Linear interpolation between numeric neighbours, holding otherwise.
fn interpolate(samples: &[Sample], at: DateTime<Utc>) -> Option<Sample> {
    let before = sample_at(samples, at)?;
    if before.ts == at {
        return Some(before.clone());
    }
    let after = samples.iter().find(|s| s.ts > at);
    let value = match (before.reading().and_then(Value::as_f64), after) {
        (Some(a), Some(next)) => match next.reading().and_then(Value::as_f64) {
            Some(b) => {
                let span = (next.ts - before.ts).num_milliseconds() as f64;
                let off = (at - before.ts).num_milliseconds() as f64;
                Some(Value::Float(a + (b - a) * off / span))
            }
            None => before.reading().cloned(),
        },
        _ => before.reading().cloned(),
    };
    Some(match value {
        Some(v) => Sample::good(at, v),
        None => Sample::bad(at),
    })
}

impl HistorianConnector for MockHistorian {
    fn name(&self) -> &'static str {
        NAME
    }

    fn as_point_lookup(&self) -> Option<&dyn PointLookup> {
        self.enabled(Capability::PointLookup)
            .then_some(self as &dyn PointLookup)
    }

    fn as_range_fetch(&self) -> Option<&dyn RangeFetch> {
        self.enabled(Capability::RangeFetch)
            .then_some(self as &dyn RangeFetch)
    }

    fn as_point_fetch(&self) -> Option<&dyn PointFetch> {
        self.enabled(Capability::PointFetch)
            .then_some(self as &dyn PointFetch)
    }

    fn as_channel_provider(&self) -> Option<&dyn ChannelProvider> {
        self.enabled(Capability::Channels)
            .then_some(self as &dyn ChannelProvider)
    }
}

#[async_trait]
impl PointLookup for MockHistorian {
    async fn resolve(
        &self,
        names: &[String],
        _dataserver: Option<&str>,
    ) -> Result<Resolution, TidemarkError> {
        {
            let mut st = self.state.lock().await;
            st.resolve_calls += 1;
            if let Some(e) = st.lookup_failure.clone() {
                return Err(e);
            }
        }
        let mut resolution = Resolution::default();
        for name in names {
            match self.points.get(&name.to_uppercase()).map(Vec::as_slice) {
                Some([source]) => resolution.mapped.push((name.clone(), source.clone())),
                _ => resolution.unmapped.push(name.clone()),
            }
        }
        Ok(resolution)
    }
}

#[async_trait]
impl RangeFetch for MockHistorian {
    async fn fetch(
        &self,
        source: &SourceId,
        range: TimeRange,
        mode: RangeMode,
    ) -> Result<Vec<Sample>, TidemarkError> {
        self.state
            .lock()
            .await
            .range_calls
            .push((source.clone(), range));
        self.enter(source).await?;
        let samples = self.series(source).await;
        match mode {
            RangeMode::Interpolated { interval } => {
                let step = TimeDelta::from_std(interval)
                    .map_err(|_| TidemarkError::InvalidArg("interval out of range".into()))?;
                let mut out = Vec::new();
                let mut t = range.start();
                while t <= range.end() {
                    if let Some(s) = interpolate(&samples, t) {
                        out.push(s);
                    }
                    t += step;
                }
                Ok(out)
            }
            RangeMode::Recorded { .. } => Ok(samples
                .into_iter()
                .filter(|s| range.contains(s.ts))
                .collect()),
            _ => Err(TidemarkError::unsupported(Capability::RangeFetch)),
        }
    }
}

#[async_trait]
impl PointFetch for MockHistorian {
    async fn fetch_at(
        &self,
        source: &SourceId,
        at: DateTime<Utc>,
        retrieval: Retrieval,
    ) -> Result<Option<Sample>, TidemarkError> {
        self.state
            .lock()
            .await
            .probe_calls
            .push((source.clone(), at));
        self.enter(source).await?;
        let samples = self.series(source).await;
        Ok(match retrieval {
            Retrieval::Recorded => sample_at(&samples, at).cloned(),
            _ => interpolate(&samples, at),
        })
    }
}

#[async_trait]
impl ChannelProvider for MockHistorian {
    async fn open_channel(
        &self,
        sources: &[SourceId],
    ) -> Result<Box<dyn PushConnection>, TidemarkError> {
        let mut st = self.state.lock().await;
        if let Some(e) = st.open_failure.take() {
            return Err(e);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        st.channels.push(OpenChannel {
            sources: sources.to_vec(),
            tx,
            closed: Arc::clone(&closed),
        });
        Ok(Box::new(MockConnection::new(rx, closed)))
    }
}

/// Handle used by tests to drive a [`MockHistorian`].
#[derive(Clone)]
pub struct MockController {
    state: Arc<Mutex<State>>,
    samples: Arc<Mutex<HashMap<SourceId, Vec<Sample>>>>,
}

impl MockController {
    /// Make every fetch for `source` fail.
    pub async fn fail_source(&self, source: impl Into<SourceId>) {
        self.state.lock().await.failing.insert(source.into());
    }

    /// Undo [`fail_source`](Self::fail_source).
    pub async fn clear_failure(&self, source: impl Into<SourceId>) {
        self.state.lock().await.failing.remove(&source.into());
    }

    /// Make the next lookups fail with `error` (`None` clears).
    pub async fn fail_lookup(&self, error: Option<TidemarkError>) {
        self.state.lock().await.lookup_failure = error;
    }

    /// Make the next channel open fail with `error`.
    pub async fn fail_next_open(&self, error: TidemarkError) {
        self.state.lock().await.open_failure = Some(error);
    }

    /// Delay every fetch by `delay`.
    pub async fn set_delay(&self, delay: Option<Duration>) {
        self.state.lock().await.delay = delay;
    }

    /// Append a recorded sample to `source`.
    pub async fn push_sample(&self, source: impl Into<SourceId>, sample: Sample) {
        let mut samples = self.samples.lock().await;
        let series = samples.entry(source.into()).or_default();
        let idx = series.partition_point(|s| s.ts <= sample.ts);
        series.insert(idx, sample);
    }

    /// Number of lookups served.
    pub async fn resolve_calls(&self) -> usize {
        self.state.lock().await.resolve_calls
    }

    /// Every ranged fetch requested so far.
    pub async fn range_calls(&self) -> Vec<(SourceId, TimeRange)> {
        self.state.lock().await.range_calls.clone()
    }

    /// Every point-in-time fetch requested so far.
    pub async fn probe_calls(&self) -> Vec<(SourceId, DateTime<Utc>)> {
        self.state.lock().await.probe_calls.clone()
    }

    /// Highest number of fetches observed in flight at once.
    pub async fn max_in_flight(&self) -> usize {
        self.state.lock().await.max_in_flight
    }

    /// Number of channels opened so far.
    pub async fn channel_count(&self) -> usize {
        self.state.lock().await.channels.len()
    }

    /// Sources requested by channel `idx`.
    pub async fn channel_sources(&self, idx: usize) -> Vec<SourceId> {
        self.state
            .lock()
            .await
            .channels
            .get(idx)
            .map(|c| c.sources.clone())
            .unwrap_or_default()
    }

    /// Whether channel `idx` has been closed by its reader.
    pub async fn is_channel_closed(&self, idx: usize) -> bool {
        self.state
            .lock()
            .await
            .channels
            .get(idx)
            .is_some_and(|c| c.closed.load(Ordering::SeqCst))
    }

    /// Deliver `event` on channel `idx`. Returns `false` if there is no such
    /// channel or its reader is gone.
    pub async fn send(&self, idx: usize, event: ChannelEvent) -> bool {
        self.state
            .lock()
            .await
            .channels
            .get(idx)
            .is_some_and(|c| c.tx.send(event).is_ok())
    }
}
