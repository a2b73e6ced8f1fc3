/*
Discrete-event engine for the memory model.

The queue is generic over the event payload so that components (and unit tests)
can define their own event vocabulary. Entries are ordered by (timestamp, seq):
`seq` is a monotonic insertion counter, so events scheduled earlier at the same
timestamp fire first. The clock only moves forward; an event can never be
dispatched with a timestamp below `now`.

Delays are unsigned, so the "negative delay" failure mode of event engines is
unrepresentable here.
*/

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

pub type Cycle = u64;

#[derive(Debug)]
struct Scheduled<E> {
    at: Cycle,
    seq: u64,
    event: E,
}

impl<E> PartialEq for Scheduled<E> {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl<E> Eq for Scheduled<E> {}

impl<E> PartialOrd for Scheduled<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for Scheduled<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.at.cmp(&other.at).then(self.seq.cmp(&other.seq))
    }
}

#[derive(Debug)]
pub struct EventQueue<E> {
    now: Cycle,
    seq: u64,
    dispatched: u64,
    heap: BinaryHeap<Reverse<Scheduled<E>>>,
}

impl<E> Default for EventQueue<E> {
    fn default() -> Self {
        Self {
            now: 0,
            seq: 0,
            dispatched: 0,
            heap: BinaryHeap::new(),
        }
    }
}

impl<E> EventQueue<E> {
    pub fn new() -> Self {
        Self::default()
    }

    // Timestamp of the most recently popped event, or the cycle the clock was
    // last advanced to, whichever is later.
    pub fn now(&self) -> Cycle {
        self.now
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    // Insert an event `delay` cycles in the future.
    pub fn schedule(&mut self, delay: Cycle, event: E) {
        let at = self.now.saturating_add(delay);
        let seq = self.seq;
        self.seq += 1;
        self.heap.push(Reverse(Scheduled { at, seq, event }));
    }

    pub fn next_timestamp(&self) -> Option<Cycle> {
        self.heap.peek().map(|entry| entry.0.at)
    }

    // Pop the next event if its timestamp is at or before `limit`, advancing
    // the clock to its timestamp.
    pub fn pop_due(&mut self, limit: Cycle) -> Option<E> {
        let at = self.next_timestamp()?;
        if at > limit {
            return None;
        }
        let entry = self.heap.pop().expect("peek just succeeded").0;
        debug_assert!(entry.at >= self.now, "event timestamp went backwards");
        self.now = entry.at;
        self.dispatched += 1;
        Some(entry.event)
    }

    // Move the clock forward without dispatching anything. Used by the driver
    // after draining all events up to an injection point.
    pub fn advance_to(&mut self, cycle: Cycle) {
        self.now = self.now.max(cycle);
    }
}
