// Shared fixtures so test modules can `use crate::helpers::*;`
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tidemark::{HistorianConnector, ResourceCache, ResourceMapping, Sample, SourceId, TimeRange};
use tidemark_mock::{MockController, MockHistorian, MockHistorianBuilder};

pub use tidemark_mock::{ChannelEvent, ScriptedConnection, encode_frame};

/// Instant `secs` seconds after the epoch.
pub fn t(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).expect("valid test timestamp")
}

/// Closed range `[start, end]` in epoch seconds.
pub fn range(start: i64, end: i64) -> TimeRange {
    TimeRange::new(t(start), t(end)).expect("valid test range")
}

/// `(ts, value)` pairs as good samples.
pub fn series(points: &[(i64, f64)]) -> Vec<Sample> {
    points.iter().map(|(s, v)| Sample::good(t(*s), *v)).collect()
}

/// A historian with `TAG1 -> S1` and `TAG2 -> S2`, plus `DUP` matching two points.
pub fn plant() -> MockHistorianBuilder {
    MockHistorian::builder()
        .point("TAG1", "S1")
        .point("TAG2", "S2")
        .ambiguous("DUP", &["S8", "S9"])
}

/// Build the historian, returning it as a connector alongside its controller.
pub fn connect(builder: MockHistorianBuilder) -> (Arc<dyn HistorianConnector>, MockController) {
    let (historian, ctl) = builder.build();
    (historian as Arc<dyn HistorianConnector>, ctl)
}

/// `{"temp": "TAG1", "setpoint": null}`.
pub fn boiler_mapping() -> ResourceMapping {
    ResourceMapping::new().bind("temp", "TAG1").unbound("setpoint")
}

pub async fn resource(
    connector: Arc<dyn HistorianConnector>,
    mapping: ResourceMapping,
) -> ResourceCache {
    ResourceCache::builder("boiler", connector)
        .mapping(mapping)
        .build()
        .await
        .expect("resource builds")
}

pub fn src(id: &str) -> SourceId {
    SourceId::new(id)
}

/// A task that bumps `counter` on every run.
pub fn counting_task(
    name: &str,
    counter: &Arc<std::sync::atomic::AtomicUsize>,
) -> Arc<dyn tidemark::Task> {
    let counter = Arc::clone(counter);
    Arc::new(tidemark::FnTask::new(name, move |_ctx| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok::<(), tidemark::TidemarkError>(())
        }
    }))
}

/// Resource over a historian whose `TAG1` always has a value.
pub async fn live_resource() -> (Arc<ResourceCache>, MockController) {
    let (conn, ctl) = connect(plant().samples("S1", series(&[(0, 1.0)])));
    (Arc::new(resource(conn, boiler_mapping()).await), ctl)
}
