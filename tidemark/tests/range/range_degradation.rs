use std::time::Duration;

use futures::StreamExt;
use tidemark::{
    Capability, RangeMode, RangeOptions, ResourceMapping, Row, TidemarkError, Value,
};
use tidemark_mock::MockHistorian;

use crate::helpers::*;

#[tokio::test]
async fn failing_column_reads_as_no_value() {
    let (conn, ctl) = connect(
        plant()
            .samples("S1", series(&[(0, 1.0)]))
            .samples("S2", series(&[(0, 2.0)])),
    );
    let mapping = ResourceMapping::new().bind("a", "TAG1").bind("b", "TAG2");
    let res = resource(conn, mapping).await;
    ctl.fail_source("S2").await;

    for mode in [RangeMode::interpolated(), RangeMode::recorded()] {
        let rows: Vec<Row> = res
            .range(range(0, 120), mode, RangeOptions::default())
            .unwrap()
            .collect()
            .await;
        assert!(!rows.is_empty());
        assert!(rows.iter().all(|r| r.get(1).is_none()));
        assert_eq!(rows[0].get(0), Some(&Value::Float(1.0)));
    }
}

#[tokio::test(start_paused = true)]
async fn column_fan_out_is_bounded() {
    let mut builder = MockHistorian::builder();
    let mut mapping = ResourceMapping::new();
    for i in 0..6 {
        builder = builder
            .point(&format!("P{i}"), format!("S{i}"))
            .samples(format!("S{i}"), series(&[(0, i as f64)]));
        mapping = mapping.bind(format!("c{i}"), format!("P{i}"));
    }
    let (conn, ctl) = connect(builder);
    let res = resource(conn, mapping).await;
    ctl.set_delay(Some(Duration::from_millis(10))).await;

    let opts = RangeOptions {
        max_concurrency: 2,
        ..RangeOptions::default()
    };
    let rows: Vec<Row> = res
        .range(range(0, 60), RangeMode::interpolated(), opts)
        .unwrap()
        .collect()
        .await;

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].get(5), Some(&Value::Float(5.0)));
    let peak = ctl.max_in_flight().await;
    assert!((1..=2).contains(&peak), "peak in flight was {peak}");
}

#[tokio::test]
async fn invalid_requests_fail_before_streaming() {
    let (conn, _ctl) = connect(plant());
    let res = resource(conn, boiler_mapping()).await;

    let zero = RangeOptions {
        max_concurrency: 0,
        ..RangeOptions::default()
    };
    let err = res.range(range(0, 60), RangeMode::interpolated(), zero).err();
    assert!(matches!(err, Some(TidemarkError::InvalidArg(_))));

    let flat = RangeMode::Interpolated {
        interval: Duration::ZERO,
    };
    let err = res.range(range(0, 60), flat, RangeOptions::default()).err();
    assert!(matches!(err, Some(TidemarkError::InvalidArg(_))));
}

#[tokio::test]
async fn missing_capabilities_are_reported() {
    let (conn, _ctl) = connect(plant().without(Capability::RangeFetch));
    let res = resource(conn, boiler_mapping()).await;
    let err = res
        .range(range(0, 60), RangeMode::interpolated(), RangeOptions::default())
        .err();
    assert_eq!(err, Some(TidemarkError::unsupported(Capability::RangeFetch)));

    let (conn, _ctl) = connect(plant().without(Capability::PointFetch));
    let res = resource(conn, boiler_mapping()).await;
    let err = res
        .range(range(0, 60), RangeMode::recorded(), RangeOptions::default())
        .err();
    assert_eq!(err, Some(TidemarkError::unsupported(Capability::PointFetch)));
}

#[tokio::test]
async fn resource_without_sources_yields_no_rows() {
    let (conn, _ctl) = connect(plant());
    let res = resource(conn, ResourceMapping::new().unbound("setpoint")).await;
    let rows: Vec<Row> = res
        .range(range(0, 600), RangeMode::interpolated(), RangeOptions::default())
        .unwrap()
        .collect()
        .await;
    assert!(rows.is_empty());
}
