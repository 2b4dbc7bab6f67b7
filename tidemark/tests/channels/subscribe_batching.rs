use tidemark::{Capability, SubscriberConfig, TidemarkError, subscribe, subscribe_sources};

use crate::helpers::*;

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_string()).collect()
}

#[tokio::test]
async fn resolves_names_and_opens_one_channel() {
    let (conn, ctl) = connect(plant());
    let mut sub = subscribe(&*conn, &names(&["tag1", "TAG2"]), None, SubscriberConfig::default())
        .await
        .unwrap();
    assert_eq!(ctl.channel_count().await, 1);
    assert_eq!(ctl.channel_sources(0).await, vec![src("S1"), src("S2")]);
    sub.close().await;
}

#[tokio::test]
async fn unresolved_names_are_reported_together() {
    let (conn, ctl) = connect(plant());
    let err = subscribe(
        &*conn,
        &names(&["TAG1", "dup", "nope"]),
        None,
        SubscriberConfig::default(),
    )
    .await
    .unwrap_err();
    assert_eq!(
        err,
        TidemarkError::Unresolved {
            names: names(&["DUP", "NOPE"])
        }
    );
    assert_eq!(ctl.channel_count().await, 0);
}

#[tokio::test]
async fn header_budget_splits_sources_across_channels() {
    let (conn, ctl) = connect(plant());
    let cfg = SubscriberConfig {
        max_header_bytes: 4,
        ..SubscriberConfig::default()
    };
    let sources = [src("S1"), src("S2")];
    let mut sub = subscribe_sources(&*conn, &sources, cfg).await.unwrap();
    assert_eq!(ctl.channel_count().await, 2);
    assert_eq!(ctl.channel_sources(1).await, vec![src("S2")]);
    sub.close().await;
}

#[tokio::test]
async fn open_failures_and_missing_capability_propagate() {
    let (conn, ctl) = connect(plant());
    ctl.fail_next_open(TidemarkError::Connection("refused".into()))
        .await;
    let err = subscribe_sources(&*conn, &[src("S1")], SubscriberConfig::default())
        .await
        .unwrap_err();
    assert_eq!(err, TidemarkError::Connection("refused".into()));

    let err = subscribe_sources(&*conn, &[], SubscriberConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, TidemarkError::InvalidArg(_)));

    let (bare, _) = connect(plant().without(Capability::Channels));
    let err = subscribe_sources(&*bare, &[src("S1")], SubscriberConfig::default())
        .await
        .unwrap_err();
    assert_eq!(err, TidemarkError::unsupported(Capability::Channels));
}

#[tokio::test]
async fn resource_subscribes_to_its_resolved_columns() {
    let (conn, ctl) = connect(plant());
    let res = resource(conn, boiler_mapping()).await;
    let mut sub = res.subscribe(SubscriberConfig::default()).await.unwrap();
    assert_eq!(ctl.channel_sources(0).await, vec![src("S1")]);
    sub.close().await;
}
