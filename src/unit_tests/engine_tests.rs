use crate::engine::EventQueue;

#[test]
fn events_fire_in_timestamp_order() {
    let mut queue: EventQueue<&str> = EventQueue::new();
    queue.schedule(30, "late");
    queue.schedule(10, "early");
    queue.schedule(20, "middle");
    assert_eq!(queue.pop_due(u64::MAX), Some("early"));
    assert_eq!(queue.now(), 10);
    assert_eq!(queue.pop_due(u64::MAX), Some("middle"));
    assert_eq!(queue.pop_due(u64::MAX), Some("late"));
    assert_eq!(queue.now(), 30);
    assert!(queue.pop_due(u64::MAX).is_none());
}

#[test]
fn equal_timestamps_fire_in_schedule_order() {
    let mut queue: EventQueue<u32> = EventQueue::new();
    for event in 0..16 {
        queue.schedule(5, event);
    }
    for expected in 0..16 {
        assert_eq!(queue.pop_due(u64::MAX), Some(expected));
    }
}

#[test]
fn pop_due_respects_the_limit() {
    let mut queue: EventQueue<u32> = EventQueue::new();
    queue.schedule(10, 1);
    queue.schedule(20, 2);
    assert_eq!(queue.pop_due(15), Some(1));
    assert_eq!(queue.pop_due(15), None);
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.pop_due(20), Some(2));
}

#[test]
fn handler_scheduled_events_fire_later_at_same_cycle() {
    // An event scheduled with zero delay during dispatch lands after every
    // already-queued event at that timestamp.
    let mut queue: EventQueue<u32> = EventQueue::new();
    queue.schedule(10, 1);
    queue.schedule(10, 2);
    assert_eq!(queue.pop_due(u64::MAX), Some(1));
    queue.schedule(0, 3);
    assert_eq!(queue.pop_due(u64::MAX), Some(2));
    assert_eq!(queue.pop_due(u64::MAX), Some(3));
    assert_eq!(queue.now(), 10);
}

#[test]
fn advance_to_never_rewinds() {
    let mut queue: EventQueue<u32> = EventQueue::new();
    queue.schedule(50, 1);
    assert_eq!(queue.pop_due(u64::MAX), Some(1));
    queue.advance_to(20);
    assert_eq!(queue.now(), 50);
    queue.advance_to(80);
    assert_eq!(queue.now(), 80);
}

#[test]
fn delays_are_relative_to_now() {
    let mut queue: EventQueue<u32> = EventQueue::new();
    queue.advance_to(100);
    queue.schedule(5, 1);
    assert_eq!(queue.next_timestamp(), Some(105));
}

#[test]
fn dispatched_counts_pops() {
    let mut queue: EventQueue<u32> = EventQueue::new();
    queue.schedule(1, 1);
    queue.schedule(2, 2);
    queue.pop_due(u64::MAX);
    queue.pop_due(u64::MAX);
    assert_eq!(queue.dispatched(), 2);
}
