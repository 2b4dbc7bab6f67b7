use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use futures::StreamExt;
use tidemark::channels::subscribe_sources;
use tidemark::{
    ChannelItem, ChannelMessage, JsonFrameDecoder, MessageDecoder, PushConnection, Sample,
    Subscriber, SubscriberConfig, SubscriptionState, TidemarkError,
};

use crate::helpers::*;

fn frame(name: &str, source: &str, secs: &[i64]) -> ChannelEvent {
    let item = ChannelItem {
        name: name.to_string(),
        source: src(source),
        samples: secs.iter().map(|s| Sample::good(t(*s), *s)).collect(),
    };
    ChannelEvent::Frame(encode_frame(&[item]))
}

fn config(capacity: usize) -> SubscriberConfig {
    SubscriberConfig {
        buffer_capacity: capacity,
        ..SubscriberConfig::default()
    }
}

fn decoder() -> Arc<dyn MessageDecoder> {
    Arc::new(JsonFrameDecoder)
}

fn boxed(conn: ScriptedConnection) -> Box<dyn PushConnection> {
    Box::new(conn)
}

fn source_of(msg: &ChannelMessage) -> String {
    msg.items[0].source.to_string()
}

#[tokio::test]
async fn fan_in_through_a_single_slot_buffer() {
    let (conn, ctl) = connect(plant());
    let cfg = SubscriberConfig {
        buffer_capacity: 1,
        max_header_bytes: 1,
    };
    let mut sub = subscribe_sources(&*conn, &[src("S1"), src("S2")], cfg)
        .await
        .unwrap();
    assert_eq!(ctl.channel_count().await, 2);
    assert_eq!(sub.state(), SubscriptionState::Open);

    assert!(ctl.send(0, frame("TAG1", "S1", &[1])).await);
    assert!(ctl.send(1, frame("TAG2", "S2", &[2])).await);
    while sub.buffered() == 0 {
        tokio::task::yield_now().await;
    }
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(sub.buffered(), 1);

    let mut seen = HashSet::new();
    for _ in 0..2 {
        let msg = sub.next().await.unwrap().unwrap();
        seen.insert(source_of(&msg));
    }
    assert_eq!(seen, HashSet::from(["S1".to_string(), "S2".to_string()]));
    assert_eq!(sub.state(), SubscriptionState::Consuming);

    sub.close().await;
    assert!(sub.next().await.is_none());
    assert_eq!(sub.state(), SubscriptionState::ClosedOk);
    assert!(ctl.is_channel_closed(0).await);
    assert!(ctl.is_channel_closed(1).await);
}

#[tokio::test]
async fn first_finished_connection_tears_down_the_rest() {
    let a = ScriptedConnection::new([frame("TAG1", "S1", &[1])]);
    let b = ScriptedConnection::new([]).then_hang();
    let b_closed = b.close_flag();
    let mut sub = Subscriber::spawn(vec![boxed(a), boxed(b)], decoder(), config(8)).unwrap();

    assert_eq!(source_of(&sub.next().await.unwrap().unwrap()), "S1");
    assert!(sub.next().await.is_none());
    assert_eq!(sub.state(), SubscriptionState::ClosedOk);
    assert!(sub.next().await.is_none());

    sub.close().await;
    assert!(b_closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn connection_failure_is_raised_after_the_backlog() {
    let a = ScriptedConnection::new([
        frame("TAG1", "S1", &[1]),
        frame("TAG1", "S1", &[2]),
        ChannelEvent::Fail(TidemarkError::Connection("reset by peer".into())),
    ]);
    let b = ScriptedConnection::new([]).then_hang();
    let mut sub = Subscriber::spawn(vec![boxed(a), boxed(b)], decoder(), config(8)).unwrap();

    for expected in [1, 2] {
        let msg = sub.next().await.unwrap().unwrap();
        assert_eq!(msg.items[0].samples[0].ts, t(expected));
    }
    let err = sub.next().await.unwrap().unwrap_err();
    assert_eq!(err, TidemarkError::Connection("reset by peer".into()));
    assert_eq!(sub.state(), SubscriptionState::ClosedError);
    assert!(sub.next().await.is_none());
}

#[tokio::test]
async fn transient_read_failures_do_not_end_the_subscription() {
    let a = ScriptedConnection::new([
        ChannelEvent::Fail(TidemarkError::Decode("truncated frame".into())),
        frame("TAG1", "S1", &[1]),
        ChannelEvent::Fail(TidemarkError::connector("channel", "slow read")),
        frame("TAG1", "S1", &[2]),
    ]);
    let mut sub = Subscriber::spawn(vec![boxed(a)], decoder(), config(4)).unwrap();

    for expected in [1, 2] {
        let msg = sub.next().await.unwrap().unwrap();
        assert_eq!(msg.items[0].samples[0].ts, t(expected));
    }
    assert!(sub.next().await.is_none());
    assert_eq!(sub.state(), SubscriptionState::ClosedOk);
}

#[tokio::test]
async fn undecodable_frames_are_dropped_and_samples_sorted() {
    let a = ScriptedConnection::new([
        ChannelEvent::Frame(b"not json".to_vec()),
        frame("TAG1", "S1", &[30, 10, 20]),
    ]);
    let mut sub = Subscriber::spawn(vec![boxed(a)], decoder(), config(4)).unwrap();

    let msg = sub.next().await.unwrap().unwrap();
    assert!(msg.is_sorted());
    assert_eq!(msg.sample_count(), 3);
    assert_eq!(msg.items[0].samples[0].ts, t(10));
    assert!(sub.next().await.is_none());
}

#[tokio::test]
async fn stream_adapter_ends_with_the_subscription() {
    let a = ScriptedConnection::new((1..=3).map(|i| frame("TAG1", "S1", &[i])));
    let sub = Subscriber::spawn(vec![boxed(a)], decoder(), config(1)).unwrap();
    let items: Vec<_> = sub.into_stream().collect().await;
    assert_eq!(items.len(), 3);
    assert!(items.iter().all(Result::is_ok));
}

#[tokio::test(start_paused = true)]
async fn get_timeout_keeps_the_subscription_open() {
    let a = ScriptedConnection::new([]).then_hang();
    let mut sub = Subscriber::spawn(vec![boxed(a)], decoder(), config(4)).unwrap();
    let err = sub
        .next_timeout(Duration::from_millis(50))
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, TidemarkError::Timeout { .. }));
    assert_eq!(sub.state(), SubscriptionState::Consuming);
    sub.close().await;
    assert!(sub.next().await.is_none());
}

#[tokio::test]
async fn dropping_the_subscriber_closes_connections() {
    let a = ScriptedConnection::new([]).then_hang();
    let closed = a.close_flag();
    let sub = Subscriber::spawn(vec![boxed(a)], decoder(), config(4)).unwrap();
    tokio::task::yield_now().await;
    drop(sub);

    tokio::time::timeout(Duration::from_secs(1), async {
        while !closed.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("connection closed after drop");
}

#[test]
fn spawn_rejects_degenerate_input() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let _guard = rt.enter();
    let err = Subscriber::spawn(Vec::new(), decoder(), config(4)).unwrap_err();
    assert!(matches!(err, TidemarkError::InvalidArg(_)));
    let one = vec![boxed(ScriptedConnection::new([]))];
    let err = Subscriber::spawn(one, decoder(), config(0)).unwrap_err();
    assert!(matches!(err, TidemarkError::InvalidArg(_)));
}

#[test]
fn spawn_requires_a_runtime() {
    let one = vec![boxed(ScriptedConnection::new([]))];
    let err = Subscriber::spawn(one, decoder(), config(4)).unwrap_err();
    assert!(matches!(err, TidemarkError::Usage(_)));
}

#[tokio::test]
async fn dropping_the_subscriber_keeps_nothing_running() {
    let a = ScriptedConnection::new([frame("TAG1", "S1", &[1])]).then_hang();
    let b = ScriptedConnection::new([]).then_hang();
    let (closed_a, closed_b) = (a.close_flag(), b.close_flag());
    let mut sub = Subscriber::spawn(vec![boxed(a), boxed(b)], decoder(), config(4)).unwrap();
    let first = sub.next().await.unwrap().unwrap();
    assert_eq!(source_of(&first), "S1");
    drop(sub);

    tokio::time::timeout(Duration::from_secs(1), async {
        while !(closed_a.load(Ordering::SeqCst) && closed_b.load(Ordering::SeqCst)) {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("every connection closed after drop");
}
