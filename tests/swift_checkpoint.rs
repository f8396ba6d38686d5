//! SWIFT escalation: grace period, budgeted purges, and release.

mod common;

use common::*;
use gossipq::flow::Zone;
use gossipq::queue::SwiftEvent;

#[test]
fn grace_expiry_escalates_and_purges_forwarded_queries() {
    let mut h = harness(config(1000, 800, 400));

    for _ in 0..8 {
        h.q.enqueue(forwarded_query(100));
    }
    assert_eq!(h.q.zone(), Zone::Flowc);
    assert_eq!(h.callout.borrow().len(), 1, "grace timer armed");

    // Nothing happens until the grace period (2s in the test hooks) is up.
    h.advance(1999);
    assert!(!h.q.in_swift());
    assert_eq!(h.hooks.borrow().enter_swift, 0);

    h.advance(1);
    // Budget with zero flush and zero fill: the full distance to the low
    // watermark (400 bytes). The purge frees a byte more than asked, so
    // five 100-byte queries go, which releases flow control on the spot.
    let log = h.hooks.borrow();
    assert_eq!(log.enter_swift, 1);
    assert_eq!(log.drops, 5);
    assert_eq!(log.leave_flowc, 1);
    drop(log);
    assert_eq!(h.q.bytes(), 300);
    assert!(!h.q.in_swift());
    assert_eq!(h.q.zone(), Zone::Normal);
    assert!(h.callout.borrow().is_empty(), "no checkpoint rescheduled");
}

#[test]
fn own_queries_survive_the_initial_purge_then_checkpoints_attack_hits() {
    let mut h = harness(config(1000, 800, 300));

    for _ in 0..4 {
        h.q.enqueue(forwarded_query(100));
    }
    for _ in 0..4 {
        h.q.enqueue(our_query(100));
    }
    assert_eq!(h.q.zone(), Zone::Flowc);

    // Initial checkpoint: needs 500, but only the four forwarded queries are
    // below the purge template; our hops-0 queries stop the scan.
    h.advance(2000);
    {
        let log = h.hooks.borrow();
        assert_eq!(log.enter_swift, 1);
        assert_eq!(log.drops, 4);
        assert_eq!(log.leave_flowc, 0);
    }
    assert_eq!(h.q.bytes(), 400);
    assert!(h.q.in_swift());
    assert_eq!(h.callout.borrow().len(), 1, "periodic checkpoint armed");

    // Next checkpoint walks query hits; plain queries rank below the lowest
    // hit template, so the budget (100 bytes, plus one message of slack)
    // comes out of our queries now.
    h.advance(1000);
    let log = h.hooks.borrow();
    assert_eq!(log.drops, 6);
    assert_eq!(log.leave_flowc, 1);
    drop(log);
    assert_eq!(h.q.bytes(), 200);
    assert_eq!(h.q.zone(), Zone::Normal);
    assert!(h.callout.borrow().is_empty());
}

#[test]
fn flush_progress_shrinks_the_checkpoint_budget() {
    let mut h = harness(config(1000, 800, 300));

    for _ in 0..8 {
        h.q.enqueue(forwarded_query(100));
    }
    assert_eq!(h.q.zone(), Zone::Flowc);

    // The peer drains a little during the grace period.
    h.q.notify_bytes_written(200);
    assert_eq!(h.q.bytes(), 600);

    h.advance(2000);
    // elapsed 2000ms -> next period 1000ms, ratio 0.5: projected flush 100,
    // projected fill 0, shortfall 300 - 100 = 200, plus 100/4 margin = 225.
    // Three 100-byte queries cover it and land exactly on the low watermark.
    let log = h.hooks.borrow();
    assert_eq!(log.drops, 3);
    assert_eq!(log.leave_flowc, 1);
    drop(log);
    assert_eq!(h.q.bytes(), 300);
    assert_eq!(h.q.zone(), Zone::Normal);
}

#[test]
fn leaving_flow_control_cancels_the_grace_timer() {
    let mut h = harness(config(1000, 800, 400));
    for _ in 0..8 {
        h.q.enqueue(forwarded_query(100));
    }
    assert_eq!(h.callout.borrow().len(), 1);

    // Drain below the low watermark before the grace period ends.
    for _ in 0..5 {
        h.drain_head();
    }
    assert_eq!(h.q.zone(), Zone::Normal);
    assert!(h.callout.borrow().is_empty(), "grace timer cancelled");

    h.advance(5000);
    assert!(!h.q.in_swift());
    assert_eq!(h.hooks.borrow().enter_swift, 0);
}

#[test]
fn stale_timer_tokens_are_ignored() {
    let mut h = harness(config(1000, 800, 400));
    for _ in 0..8 {
        h.q.enqueue(forwarded_query(100));
    }
    for _ in 0..5 {
        h.drain_head();
    }
    assert_eq!(h.q.zone(), Zone::Normal);

    // Deliver tokens the queue no longer expects; both are no-ops.
    h.q.on_timer(SwiftEvent::Grace);
    h.q.on_timer(SwiftEvent::Checkpoint);
    assert!(!h.q.in_swift());
    assert_eq!(h.hooks.borrow().enter_swift, 0);
    assert_eq!(h.q.zone(), Zone::Normal);
}

#[test]
fn swift_keeps_rescheduling_while_flow_control_persists() {
    let mut h = harness(config(1000, 800, 100));

    // Control traffic cannot be shed, so once the two queries are gone the
    // checkpoints come up empty and flow control persists.
    for _ in 0..2 {
        h.q.enqueue(forwarded_query(100));
    }
    for _ in 0..6 {
        h.q.enqueue(frame_msg(
            gossipq::frame::FrameKind::TablePatch,
            1,
            0,
            gossipq::buffer::Priority::Control,
            100,
            false,
        ));
    }
    assert_eq!(h.q.zone(), Zone::Flowc);

    h.advance(2000); // initial: sheds the two forwarded queries
    {
        let log = h.hooks.borrow();
        assert_eq!(log.enter_swift, 1);
        assert_eq!(log.drops, 2);
    }
    assert_eq!(h.q.bytes(), 600);
    assert!(h.q.in_swift());
    assert_eq!(h.callout.borrow().len(), 1);

    // Control traffic outranks every purge template: checkpoints fire and
    // reschedule without shedding anything.
    h.advance(1000);
    assert_eq!(h.hooks.borrow().drops, 2);
    assert!(h.q.in_swift());
    assert_eq!(h.callout.borrow().len(), 1, "checkpoint rearmed");

    h.advance(1000);
    assert!(h.q.in_swift());
    assert_eq!(h.q.bytes(), 600);
}
