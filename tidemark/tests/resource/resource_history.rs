use tidemark::{HistoryColumn, Meta, ResourceCache, Retrieval, Sample, TidemarkError, Value};

use crate::helpers::*;

async fn refreshed(retention: usize, refreshes: i64) -> ResourceCache {
    let (conn, ctl) = connect(plant());
    let res = ResourceCache::builder("boiler", conn)
        .mapping(boiler_mapping())
        .retention(retention)
        .build()
        .await
        .unwrap();
    for i in 0..refreshes {
        ctl.push_sample("S1", Sample::good(t(i), i as f64)).await;
        res.refresh(Retrieval::Recorded).await.unwrap();
    }
    res
}

#[tokio::test]
async fn history_keeps_the_most_recent_refreshes() {
    for (retention, extra) in [(1, 1), (3, 2), (5, 7)] {
        let res = refreshed(retention, (retention + extra) as i64).await;
        assert_eq!(res.history_len(), retention);

        let first = extra as i64;
        let expected: Vec<Option<Value>> = (first..first + retention as i64)
            .map(|i| Some(Value::Float(i as f64)))
            .collect();
        let temp = res.history("temp").unwrap();
        assert_eq!(temp.values().unwrap(), expected.as_slice());

        let setpoint = res.history("setpoint").unwrap();
        assert_eq!(setpoint, HistoryColumn::Values(vec![None; retention]));

        let stamps = res.history("timestamp").unwrap();
        assert_eq!(stamps.timestamps().unwrap().len(), retention);
        assert!(res.history("nope").is_none());
    }
}

#[tokio::test]
async fn failed_refresh_appends_nothing() {
    let (conn, ctl) = connect(plant().samples("S1", series(&[(0, 1.0)])));
    let res = resource(conn, boiler_mapping()).await;
    res.refresh(Retrieval::Recorded).await.unwrap();
    ctl.fail_source("S1").await;
    assert!(res.refresh(Retrieval::Recorded).await.is_err());
    assert_eq!(res.history_len(), 1);
}

#[tokio::test]
async fn concurrent_refreshes_all_land() {
    let (conn, _ctl) = connect(plant().samples("S1", series(&[(0, 1.0)])));
    let res = resource(conn, boiler_mapping()).await;
    let (a, b, c) = tokio::join!(
        res.refresh(Retrieval::Recorded),
        res.refresh(Retrieval::Recorded),
        res.refresh(Retrieval::Recorded),
    );
    assert!(a.is_ok() && b.is_ok() && c.is_ok());
    assert_eq!(res.history_len(), 3);
}

#[tokio::test]
async fn meta_entries_are_write_once() {
    let (conn, _ctl) = connect(plant());
    let mut seed = Meta::default();
    seed.insert("site", "north").unwrap();
    let res = ResourceCache::builder("boiler", conn)
        .mapping(boiler_mapping())
        .meta(seed)
        .build()
        .await
        .unwrap();

    res.set_meta("unit", 4).unwrap();
    let err = res.set_meta("site", "south").unwrap_err();
    assert!(matches!(err, TidemarkError::InvalidArg(_)));

    let meta = res.meta();
    assert_eq!(meta.len(), 2);
    assert_eq!(meta.get("site"), Some(&serde_json::json!("north")));
    assert_eq!(meta.get("unit"), Some(&serde_json::json!(4)));
}
