//! Warn-zone notifications and their hysteresis.

mod common;

use common::*;
use gossipq::flow::Zone;

#[test]
fn warn_fires_once_on_the_way_up_and_once_on_the_way_down() {
    let mut h = harness(config(1000, 800, 400));

    for _ in 0..5 {
        h.q.enqueue(our_query(100));
    }
    assert_eq!(h.q.bytes(), 500);
    assert_eq!(h.q.zone(), Zone::Warn);
    {
        let log = h.hooks.borrow();
        assert_eq!(log.enter_warn, 1, "one notification per crossing");
        assert_eq!(log.leave_warn, 0);
        assert_eq!(log.enter_flowc, 0);
    }

    // First drain lands exactly on the low watermark: still warned.
    h.drain_head();
    assert_eq!(h.q.bytes(), 400);
    assert_eq!(h.q.zone(), Zone::Warn);
    assert_eq!(h.hooks.borrow().leave_warn, 0);

    h.drain_head();
    assert_eq!(h.q.bytes(), 300);
    assert_eq!(h.q.zone(), Zone::Normal);
    let log = h.hooks.borrow();
    assert_eq!(log.leave_warn, 1);
    assert_eq!(log.enter_warn, 1);
}

#[test]
fn bouncing_around_the_low_watermark_does_not_renotify() {
    let mut h = harness(config(1000, 800, 400));
    for _ in 0..4 {
        h.q.enqueue(our_query(100));
    }
    assert_eq!(h.hooks.borrow().enter_warn, 1);

    // Stay in the warn zone across further traffic.
    h.q.enqueue(our_query(100));
    h.drain_head();
    h.q.enqueue(our_query(100));
    assert_eq!(h.q.zone(), Zone::Warn);
    assert_eq!(h.hooks.borrow().enter_warn, 1);
    assert_eq!(h.hooks.borrow().leave_warn, 0);
}
