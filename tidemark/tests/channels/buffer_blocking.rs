use tidemark::{MessageBuffer, TidemarkError};
use tokio_test::{assert_pending, assert_ready, assert_ready_err, assert_ready_ok, task};

#[test]
fn second_put_waits_for_the_first_get() {
    let buf = MessageBuffer::new(1).unwrap();

    let mut put_a = task::spawn(buf.put("A1"));
    assert_ready_ok!(put_a.poll());
    let mut put_b = task::spawn(buf.put("B1"));
    assert_pending!(put_b.poll());
    assert!(!put_b.is_woken());

    let mut get = task::spawn(buf.get(None));
    assert_eq!(assert_ready_ok!(get.poll()), "A1");
    assert!(put_b.is_woken());
    assert_ready_ok!(put_b.poll());
    assert_eq!(buf.len(), 1);
}

#[test]
fn close_releases_a_blocked_put() {
    let buf = MessageBuffer::new(1).unwrap();
    assert_ready_ok!(task::spawn(buf.put(1)).poll());
    let mut blocked = task::spawn(buf.put(2));
    assert_pending!(blocked.poll());

    buf.close();
    assert!(blocked.is_woken());
    assert_eq!(assert_ready_err!(blocked.poll()), TidemarkError::Closed);

    // the item queued before the close is still served
    assert_eq!(assert_ready_ok!(task::spawn(buf.get(None)).poll()), 1);
    assert_eq!(
        assert_ready_err!(task::spawn(buf.get(None)).poll()),
        TidemarkError::Closed
    );
}

#[test]
fn close_releases_a_blocked_get() {
    let buf = MessageBuffer::<u32>::new(2).unwrap();
    let mut waiting = task::spawn(buf.get(None));
    assert_pending!(waiting.poll());

    buf.close();
    assert!(waiting.is_woken());
    assert_eq!(assert_ready_err!(waiting.poll()), TidemarkError::Closed);
    assert!(buf.is_closed());
}

#[test]
fn concurrent_get_is_a_usage_error() {
    let buf = MessageBuffer::<u32>::new(2).unwrap();
    let mut first = task::spawn(buf.get(None));
    assert_pending!(first.poll());

    let second = assert_ready!(task::spawn(buf.get(None)).poll());
    assert!(matches!(second, Err(TidemarkError::Usage(_))));

    // dropping the waiting get frees the consumer slot
    drop(first);
    assert_ready_ok!(task::spawn(buf.put(9)).poll());
    assert_eq!(assert_ready_ok!(task::spawn(buf.get(None)).poll()), 9);
}
